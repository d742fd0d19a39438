//! Shared fakes and fixtures for integration tests

#![allow(dead_code)]

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use chrono::NaiveDate;
use market_history_ingest::fetcher::{DayFetcher, FetcherError, FetcherResult};
use market_history_ingest::identifier::{LabelEntry, LabelLookup, LookupError};
use market_history_ingest::{NumericId, RecordRow};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const FIXTURE_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/market-history-2003-10-01.csv"
);

pub const HEADER: &str = "date,region_id,type_id,average,highest,lowest,volume,order_count";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn fixture_date() -> NaiveDate {
    date(2003, 10, 1)
}

pub fn fixture_csv() -> String {
    std::fs::read_to_string(FIXTURE_PATH).unwrap()
}

pub fn compress(text: &str) -> Bytes {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    Bytes::from(encoder.finish().unwrap())
}

/// CSV for `day` with one row per (region, type) pair
pub fn day_csv(day: NaiveDate, pairs: &[(NumericId, NumericId)]) -> String {
    let mut text = format!("{HEADER}\n");
    for (i, (region_id, type_id)) in pairs.iter().enumerate() {
        text.push_str(&format!("{day},{region_id},{type_id},5.5,6,5,{},{}\n", 100 + i, 1 + i));
    }
    text
}

pub fn record(day: NaiveDate, region_id: NumericId, type_id: NumericId) -> RecordRow {
    RecordRow {
        date: day,
        region_id,
        type_id,
        average: Decimal::new(55, 1),
        highest: Decimal::from(6),
        lowest: Decimal::from(5),
        volume: 100,
        order_count: 1,
    }
}

/// The five rows of the 2003-10-01 fixture
pub fn expected_fixture_records() -> Vec<RecordRow> {
    [
        (18, 10, 340, 2),
        (20, 14, 143, 1),
        (34, 1, 21188886, 43),
        (35, 4, 9250727, 40),
        (36, 16, 216188, 20),
    ]
    .into_iter()
    .map(|(type_id, price, volume, order_count)| RecordRow {
        date: fixture_date(),
        region_id: 10000001,
        type_id,
        average: Decimal::from(price),
        highest: Decimal::from(price),
        lowest: Decimal::from(price),
        volume,
        order_count,
    })
    .collect()
}

/// Serves archives from memory; unknown dates answer 404
#[derive(Default)]
pub struct MapFetcher {
    archives: HashMap<NaiveDate, Bytes>,
    requests: Mutex<Vec<NaiveDate>>,
}

impl MapFetcher {
    pub fn with(mut self, day: NaiveDate, bytes: Bytes) -> Self {
        self.archives.insert(day, bytes);
        self
    }

    pub fn requests(&self) -> Vec<NaiveDate> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

#[async_trait]
impl DayFetcher for MapFetcher {
    async fn fetch_day(&self, day: NaiveDate) -> FetcherResult<Bytes> {
        self.requests.lock().unwrap().push(day);
        self.archives
            .get(&day)
            .cloned()
            .ok_or_else(|| FetcherError::HttpError {
                status: 404,
                url: format!("memory://{day}"),
            })
    }

    fn base_url(&self) -> &str {
        "memory://"
    }
}

/// Label service knowing a fixed id set; any unknown id rejects the batch
#[derive(Default)]
pub struct FakeLookup {
    known: HashMap<NumericId, String>,
    calls: Mutex<Vec<Vec<NumericId>>>,
    failing: AtomicBool,
}

impl FakeLookup {
    /// Knows every id in `ids` as "label-<id>"
    pub fn knowing(ids: impl IntoIterator<Item = NumericId>) -> Self {
        Self {
            known: ids.into_iter().map(|id| (id, format!("label-{id}"))).collect(),
            ..Self::default()
        }
    }

    /// Answer every call with a server error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<NumericId>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every id sent to the service, in call order
    pub fn sent_ids(&self) -> Vec<NumericId> {
        self.calls.lock().unwrap().iter().flatten().copied().collect()
    }
}

#[async_trait]
impl LabelLookup for FakeLookup {
    async fn lookup(&self, ids: &[NumericId]) -> Result<Vec<LabelEntry>, LookupError> {
        self.calls.lock().unwrap().push(ids.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookupError::Server {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        ids.iter()
            .map(|id| {
                self.known
                    .get(id)
                    .map(|name| LabelEntry {
                        id: *id,
                        name: name.clone(),
                        category: "inventory_type".to_string(),
                    })
                    .ok_or(LookupError::UnknownId)
            })
            .collect()
    }
}
