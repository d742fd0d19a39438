//! SQLite implementation of [`MarketStore`]

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::query::{paginate, SeriesPoint};
use super::{
    Granularity, LabelledId, MarketQuery, MarketSeries, MarketStore, Period, PricePoint, StoreError,
    StoreResult, StoreSummary, VolumePoint, DAILY_PAGE_SIZE, MAX_LABELS_PER_STATEMENT,
    MAX_ROWS_PER_STATEMENT,
};
use crate::{IdKind, MarketDay, NumericId, RecordRow};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS completed_dates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS market_data (
        date_id INTEGER NOT NULL REFERENCES completed_dates(id),
        region_id INTEGER NOT NULL,
        type_id INTEGER NOT NULL,
        average REAL NOT NULL,
        highest REAL NOT NULL,
        lowest REAL NOT NULL,
        volume INTEGER NOT NULL,
        order_count INTEGER NOT NULL,
        PRIMARY KEY (date_id, region_id, type_id)
    )",
    "CREATE TABLE IF NOT EXISTS region_label (
        id INTEGER PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS type_label (
        id INTEGER PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

fn label_table(kind: IdKind) -> &'static str {
    match kind {
        IdKind::Region => "region_label",
        IdKind::Type => "type_label",
    }
}

/// Row in `market_data` column order
struct MarketRow {
    region_id: i64,
    type_id: i64,
    average: f64,
    highest: f64,
    lowest: f64,
    volume: i64,
    order_count: i64,
}

impl TryFrom<&RecordRow> for MarketRow {
    type Error = StoreError;

    fn try_from(record: &RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            region_id: i64::from(record.region_id),
            type_id: i64::from(record.type_id),
            average: price("average", record.average)?,
            highest: price("highest", record.highest)?,
            lowest: price("lowest", record.lowest)?,
            volume: integer("volume", record.volume)?,
            order_count: integer("order_count", record.order_count)?,
        })
    }
}

fn price(field: &'static str, value: Decimal) -> StoreResult<f64> {
    value.to_f64().ok_or_else(|| StoreError::ValueOutOfRange {
        field,
        value: value.to_string(),
    })
}

fn integer(field: &'static str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::ValueOutOfRange {
        field,
        value: value.to_string(),
    })
}

fn stored<T: TryFrom<i64>>(field: &'static str, value: i64) -> StoreResult<T> {
    T::try_from(value).map_err(|_| StoreError::ValueOutOfRange {
        field,
        value: value.to_string(),
    })
}

/// Measures a series query selects
#[derive(Debug, Clone, Copy)]
enum Measure {
    Prices,
    Volumes,
}

impl Measure {
    fn columns(self, granularity: Granularity) -> &'static str {
        match (self, granularity) {
            (Measure::Prices, Granularity::Daily) => {
                "m.average AS average, m.highest AS highest, m.lowest AS lowest"
            }
            (Measure::Prices, _) => {
                "AVG(m.average) AS average, MAX(m.highest) AS highest, MIN(m.lowest) AS lowest"
            }
            (Measure::Volumes, Granularity::Daily) => "m.volume AS volume, m.order_count AS order_count",
            (Measure::Volumes, _) => "SUM(m.volume) AS volume, SUM(m.order_count) AS order_count",
        }
    }
}

/// SELECT for one series page, labels joined in
fn series_query(query: &MarketQuery, measure: Measure) -> QueryBuilder<'static, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT CAST(strftime('%Y', d.date) AS INTEGER) AS year, \
         CAST(strftime('%m', d.date) AS INTEGER) AS month, \
         CAST(strftime('%d', d.date) AS INTEGER) AS day, \
         m.region_id AS region_id, r.value AS region_name, \
         m.type_id AS type_id, t.value AS type_name, ",
    );
    qb.push(measure.columns(query.granularity));
    qb.push(
        " FROM market_data m \
         JOIN completed_dates d ON d.id = m.date_id \
         LEFT JOIN region_label r ON r.id = m.region_id \
         LEFT JOIN type_label t ON t.id = m.type_id \
         WHERE d.date >= ",
    );
    qb.push_bind(query.start);
    qb.push(" AND d.date <= ").push_bind(query.end);
    push_id_filter(&mut qb, "m.region_id", &query.regions);
    push_id_filter(&mut qb, "m.type_id", &query.types);

    match query.granularity {
        Granularity::Daily => {
            if let Some(before) = query.before {
                qb.push(" AND d.date < ").push_bind(before);
            }
            qb.push(format!(
                " ORDER BY d.date DESC, m.region_id, m.type_id LIMIT {}",
                DAILY_PAGE_SIZE + 1
            ));
        }
        Granularity::Monthly => {
            qb.push(
                " GROUP BY year, month, m.region_id, m.type_id \
                 ORDER BY year DESC, month DESC, m.region_id, m.type_id",
            );
        }
        Granularity::Annual => {
            qb.push(" GROUP BY year, m.region_id, m.type_id ORDER BY year DESC, m.region_id, m.type_id");
        }
    }
    qb
}

fn push_id_filter(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &BTreeSet<NumericId>) {
    qb.push(format!(" AND {column} IN ("));
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(i64::from(*id));
    }
    list.push_unseparated(")");
}

/// Period, region and type of a series row
fn series_key(row: &SqliteRow, granularity: Granularity) -> StoreResult<(Period, LabelledId, LabelledId)> {
    let year: i32 = stored("year", row.try_get("year")?)?;
    let month: u32 = stored("month", row.try_get("month")?)?;

    let period = match granularity {
        Granularity::Daily => {
            let day: u32 = stored("day", row.try_get("day")?)?;
            let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
                StoreError::ValueOutOfRange {
                    field: "date",
                    value: format!("{year}-{month}-{day}"),
                }
            })?;
            Period::Day(date)
        }
        Granularity::Monthly => Period::Month { year, month },
        Granularity::Annual => Period::Year(year),
    };

    let region = LabelledId {
        id: stored("region_id", row.try_get("region_id")?)?,
        name: row.try_get("region_name")?,
    };
    let item_type = LabelledId {
        id: stored("type_id", row.try_get("type_id")?)?,
        name: row.try_get("type_name")?,
    };
    Ok((period, region, item_type))
}

fn into_series<T: SeriesPoint>(points: Vec<T>, granularity: Granularity) -> MarketSeries<T> {
    match granularity {
        Granularity::Daily => paginate(points, DAILY_PAGE_SIZE),
        Granularity::Monthly | Granularity::Annual => MarketSeries {
            rows: points,
            next_before: None,
        },
    }
}

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteMarketStore {
    pool: SqlitePool,
}

impl SqliteMarketStore {
    /// Open (creating if missing) the database at `url` and bootstrap the schema
    ///
    /// `sqlite::memory:` URLs are routed to [`SqliteMarketStore::in_memory`].
    pub async fn connect(url: &str) -> StoreResult<Self> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }

        info!("Connecting to database: {}", url);
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database
    ///
    /// Pinned to a single connection that is never recycled, so every caller
    /// sees the same database for the lifetime of the store.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and bootstrap the schema
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.initialize_tables().await?;
        Ok(store)
    }

    /// Create tables if they do not exist
    pub async fn initialize_tables(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema ready");
        Ok(())
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn count(&self, sql: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl MarketStore for SqliteMarketStore {
    async fn completed_dates(&self) -> StoreResult<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>("SELECT date FROM completed_dates ORDER BY date")
            .fetch_all(&self.pool)
            .await?;
        Ok(dates)
    }

    async fn labels(&self, kind: IdKind) -> StoreResult<Vec<(NumericId, String)>> {
        let sql = format!("SELECT id, value FROM {} ORDER BY id", label_table(kind));
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(id, value)| -> StoreResult<(NumericId, String)> {
                Ok((stored("label id", id)?, value))
            })
            .collect()
    }

    async fn upsert_labels(&self, kind: IdKind, labels: &[(NumericId, String)]) -> StoreResult<()> {
        if labels.is_empty() {
            return Ok(());
        }

        let table = label_table(kind);
        for chunk in labels.chunks(MAX_LABELS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("INSERT INTO {table} (id, value) "));
            qb.push_values(chunk, |mut row, (id, value)| {
                row.push_bind(i64::from(*id)).push_bind(value.as_str());
            });
            qb.push(" ON CONFLICT(id) DO NOTHING");
            qb.build().execute(&self.pool).await?;
        }

        debug!(%kind, count = labels.len(), "Labels upserted");
        Ok(())
    }

    async fn insert_day(&self, day: &MarketDay) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO completed_dates (date) VALUES (?) ON CONFLICT(date) DO NOTHING")
            .bind(day.date)
            .execute(&mut *tx)
            .await?;

        let date_id: i64 = sqlx::query_scalar("SELECT id FROM completed_dates WHERE date = ?")
            .bind(day.date)
            .fetch_one(&mut *tx)
            .await?;

        for chunk in day.records.chunks(MAX_ROWS_PER_STATEMENT) {
            let rows = chunk
                .iter()
                .map(MarketRow::try_from)
                .collect::<StoreResult<Vec<_>>>()?;

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO market_data \
                 (date_id, region_id, type_id, average, highest, lowest, volume, order_count) ",
            );
            qb.push_values(rows, |mut row, r| {
                row.push_bind(date_id)
                    .push_bind(r.region_id)
                    .push_bind(r.type_id)
                    .push_bind(r.average)
                    .push_bind(r.highest)
                    .push_bind(r.lowest)
                    .push_bind(r.volume)
                    .push_bind(r.order_count);
            });
            qb.push(" ON CONFLICT(date_id, region_id, type_id) DO NOTHING");
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(date = %day.date, rows = day.len(), date_id, "Day committed");
        Ok(())
    }

    async fn summary(&self) -> StoreResult<StoreSummary> {
        let (first_date, last_date): (Option<NaiveDate>, Option<NaiveDate>) =
            sqlx::query_as("SELECT MIN(date), MAX(date) FROM completed_dates")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreSummary {
            completed_days: self.count("SELECT COUNT(*) FROM completed_dates").await?,
            first_date,
            last_date,
            market_rows: self.count("SELECT COUNT(*) FROM market_data").await?,
            region_labels: self.count("SELECT COUNT(*) FROM region_label").await?,
            type_labels: self.count("SELECT COUNT(*) FROM type_label").await?,
        })
    }

    async fn price_series(&self, query: &MarketQuery) -> StoreResult<MarketSeries<PricePoint>> {
        query.validate()?;
        if query.selects_nothing() {
            return Ok(MarketSeries::empty());
        }

        let rows = series_query(query, Measure::Prices)
            .build()
            .fetch_all(&self.pool)
            .await?;

        let points = rows
            .iter()
            .map(|row| -> StoreResult<PricePoint> {
                let (period, region, item_type) = series_key(row, query.granularity)?;
                Ok(PricePoint {
                    period,
                    region,
                    item_type,
                    average: row.try_get("average")?,
                    highest: row.try_get("highest")?,
                    lowest: row.try_get("lowest")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(granularity = %query.granularity, rows = points.len(), "Price series read");
        Ok(into_series(points, query.granularity))
    }

    async fn volume_series(&self, query: &MarketQuery) -> StoreResult<MarketSeries<VolumePoint>> {
        query.validate()?;
        if query.selects_nothing() {
            return Ok(MarketSeries::empty());
        }

        let rows = series_query(query, Measure::Volumes)
            .build()
            .fetch_all(&self.pool)
            .await?;

        let points = rows
            .iter()
            .map(|row| -> StoreResult<VolumePoint> {
                let (period, region, item_type) = series_key(row, query.granularity)?;
                Ok(VolumePoint {
                    period,
                    region,
                    item_type,
                    volume: stored("volume", row.try_get("volume")?)?,
                    order_count: stored("order_count", row.try_get("order_count")?)?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(granularity = %query.granularity, rows = points.len(), "Volume series read");
        Ok(into_series(points, query.granularity))
    }
}
