//! Price and volume series read back from a populated store

use rust_decimal::Decimal;

use market_history_ingest::store::{
    Granularity, MarketQuery, MarketStore, Period, QueryError, SqliteMarketStore, StoreError,
};
use market_history_ingest::{IdKind, MarketDay, NumericId, RecordRow};

use crate::support::date;

const REGIONS: [NumericId; 3] = [10000001, 10000002, 10000003];
const TYPES: [NumericId; 4] = [34, 35, 36, 37];

/// Day `i` carries average 10+i, highest 20+i, lowest 1+i, volume 100*(i+1), orders i+1
fn seeded_days() -> Vec<chrono::NaiveDate> {
    vec![
        date(2004, 1, 30),
        date(2004, 1, 31),
        date(2004, 2, 1),
        date(2005, 1, 1),
    ]
}

async fn seeded_store() -> SqliteMarketStore {
    let store = SqliteMarketStore::in_memory().await.unwrap();

    for (i, day) in seeded_days().into_iter().enumerate() {
        let i = i as i64;
        let records = REGIONS
            .iter()
            .flat_map(|region_id| TYPES.iter().map(move |type_id| (*region_id, *type_id)))
            .map(|(region_id, type_id)| RecordRow {
                date: day,
                region_id,
                type_id,
                average: Decimal::from(10 + i),
                highest: Decimal::from(20 + i),
                lowest: Decimal::from(1 + i),
                volume: 100 * (i as u64 + 1),
                order_count: i as u64 + 1,
            })
            .collect();
        store.insert_day(&MarketDay::new(day, records)).await.unwrap();
    }

    store
        .upsert_labels(IdKind::Region, &[(10000002, "The Forge".to_string())])
        .await
        .unwrap();
    store
        .upsert_labels(IdKind::Type, &[(34, "Tritanium".to_string())])
        .await
        .unwrap();
    store
}

fn everything(granularity: Granularity) -> MarketQuery {
    MarketQuery::new(granularity, date(2004, 1, 1), date(2005, 12, 31))
        .regions(REGIONS)
        .types(TYPES)
}

#[tokio::test]
async fn test_daily_prices_page_through_whole_days() {
    let store = seeded_store().await;

    let first = store.price_series(&everything(Granularity::Daily)).await.unwrap();
    assert_eq!(first.rows.len(), 24);
    assert_eq!(first.rows[0].period, Period::Day(date(2005, 1, 1)));
    assert_eq!(first.rows[23].period, Period::Day(date(2004, 2, 1)));
    assert_eq!(first.next_before, Some(date(2004, 2, 1)));

    let cursor = first.next_before.unwrap();
    let second = store
        .price_series(&everything(Granularity::Daily).before(cursor))
        .await
        .unwrap();
    assert_eq!(second.rows.len(), 24);
    assert_eq!(second.rows[0].period, Period::Day(date(2004, 1, 31)));
    assert_eq!(second.rows[23].period, Period::Day(date(2004, 1, 30)));
    assert_eq!(second.next_before, None);
}

#[tokio::test]
async fn test_daily_rows_carry_joined_labels() {
    let store = seeded_store().await;
    let query = MarketQuery::new(Granularity::Daily, date(2005, 1, 1), date(2005, 1, 1))
        .regions([10000002, 10000003])
        .types([34]);

    let series = store.price_series(&query).await.unwrap();

    assert_eq!(series.rows.len(), 2);
    assert_eq!(series.rows[0].region.id, 10000002);
    assert_eq!(series.rows[0].region.name.as_deref(), Some("The Forge"));
    assert_eq!(series.rows[0].item_type.name.as_deref(), Some("Tritanium"));
    assert_eq!(series.rows[1].region.id, 10000003);
    assert_eq!(series.rows[1].region.name, None);
}

#[tokio::test]
async fn test_filters_and_inclusive_range() {
    let store = seeded_store().await;
    let query = MarketQuery::new(Granularity::Daily, date(2004, 1, 31), date(2004, 2, 1))
        .regions([10000001, 10000003])
        .types([36]);

    let series = store.volume_series(&query).await.unwrap();

    let keys: Vec<_> = series
        .rows
        .iter()
        .map(|row| (row.period.day().unwrap(), row.region.id, row.item_type.id, row.volume))
        .collect();
    assert_eq!(
        keys,
        vec![
            (date(2004, 2, 1), 10000001, 36, 300),
            (date(2004, 2, 1), 10000003, 36, 300),
            (date(2004, 1, 31), 10000001, 36, 200),
            (date(2004, 1, 31), 10000003, 36, 200),
        ]
    );
    assert_eq!(series.next_before, None);
}

#[tokio::test]
async fn test_monthly_prices_aggregate_each_month() {
    let store = seeded_store().await;
    let query = MarketQuery::new(Granularity::Monthly, date(2004, 1, 1), date(2005, 12, 31))
        .regions([10000002])
        .types([34]);

    let series = store.price_series(&query).await.unwrap();

    let periods: Vec<_> = series.rows.iter().map(|row| row.period).collect();
    assert_eq!(
        periods,
        vec![
            Period::Month { year: 2005, month: 1 },
            Period::Month { year: 2004, month: 2 },
            Period::Month { year: 2004, month: 1 },
        ]
    );

    let january = &series.rows[2];
    assert_eq!(january.average, 10.5);
    assert_eq!(january.highest, 21.0);
    assert_eq!(january.lowest, 1.0);
    assert_eq!(january.region.name.as_deref(), Some("The Forge"));
    assert_eq!(series.next_before, None);
}

#[tokio::test]
async fn test_annual_volumes_sum_each_year() {
    let store = seeded_store().await;

    let series = store.volume_series(&everything(Granularity::Annual)).await.unwrap();

    // 2 years x 3 regions x 4 types
    assert_eq!(series.rows.len(), 24);
    let first = &series.rows[0];
    assert_eq!(first.period, Period::Year(2005));
    assert_eq!((first.volume, first.order_count), (400, 4));

    let last = series.rows.last().unwrap();
    assert_eq!(last.period, Period::Year(2004));
    assert_eq!((last.region.id, last.item_type.id), (10000003, 37));
    assert_eq!((last.volume, last.order_count), (600, 6));
}

#[tokio::test]
async fn test_annual_prices_ignore_cursor() {
    let store = seeded_store().await;
    let query = MarketQuery::new(Granularity::Annual, date(2004, 1, 1), date(2004, 12, 31))
        .regions([10000001])
        .types([35])
        .before(date(2004, 1, 1));

    let series = store.price_series(&query).await.unwrap();

    assert_eq!(series.rows.len(), 1);
    assert_eq!(series.rows[0].average, 11.0);
    assert_eq!(series.rows[0].highest, 22.0);
    assert_eq!(series.rows[0].lowest, 1.0);
}

#[tokio::test]
async fn test_oversized_selection_is_rejected() {
    let store = seeded_store().await;
    let query = everything(Granularity::Daily).regions([1, 2, 3]);

    assert!(matches!(
        store.price_series(&query).await,
        Err(StoreError::Query(QueryError::TooManyRegions(6)))
    ));
}

#[tokio::test]
async fn test_empty_selection_returns_nothing() {
    let store = seeded_store().await;
    let query = MarketQuery::new(Granularity::Daily, date(2004, 1, 1), date(2005, 12, 31)).regions(REGIONS);

    let series = store.volume_series(&query).await.unwrap();
    assert!(series.rows.is_empty());
    assert_eq!(series.next_before, None);
}
