//! Durable storage of market days, labels and completion markers
//!
//! A day is stored as one `completed_dates` row plus its `market_data` rows,
//! written in a single transaction. The presence of a completion row is the
//! proof that the day is fully persisted.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::{IdKind, MarketDay, NumericId};

pub mod query;
pub mod sqlite;

pub use query::{
    Granularity, LabelledId, MarketQuery, MarketSeries, Period, PricePoint, QueryError, VolumePoint,
    DAILY_PAGE_SIZE, MAX_QUERY_REGIONS, MAX_QUERY_TYPES,
};
pub use sqlite::SqliteMarketStore;

/// Market rows per insert statement (8 parameters each)
pub const MAX_ROWS_PER_STATEMENT: usize = 2000;

/// Labels per upsert statement (2 parameters each)
pub const MAX_LABELS_PER_STATEMENT: usize = 8000;

/// Default database location
pub const DEFAULT_DATABASE_URL: &str = "sqlite://market-history.db";

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Driver or constraint error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A value does not fit the column type
    #[error("{field} value {value} does not fit the store")]
    ValueOutOfRange {
        /// Column name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Rejected series query
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate view of the store contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    /// Days with a completion marker
    pub completed_days: u64,
    /// Earliest completed day
    pub first_date: Option<NaiveDate>,
    /// Latest completed day
    pub last_date: Option<NaiveDate>,
    /// Total market rows
    pub market_rows: u64,
    /// Stored region labels
    pub region_labels: u64,
    /// Stored type labels
    pub type_labels: u64,
}

/// Persistence backend
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Every day with a completion marker, ascending
    async fn completed_dates(&self) -> StoreResult<Vec<NaiveDate>>;

    /// Stored labels of one namespace, ascending by id
    async fn labels(&self, kind: IdKind) -> StoreResult<Vec<(NumericId, String)>>;

    /// Insert labels, keeping any existing label for the same id
    async fn upsert_labels(&self, kind: IdKind, labels: &[(NumericId, String)]) -> StoreResult<()>;

    /// Write a day and its completion marker atomically
    ///
    /// Re-inserting an already stored day changes nothing and does not fail.
    async fn insert_day(&self, day: &MarketDay) -> StoreResult<()>;

    /// Row and label counts
    async fn summary(&self) -> StoreResult<StoreSummary>;

    /// Average, highest and lowest prices per period, region and type
    ///
    /// Daily queries return one page; see [`MarketSeries::next_before`].
    async fn price_series(&self, query: &MarketQuery) -> StoreResult<MarketSeries<PricePoint>>;

    /// Volume and order count per period, region and type
    async fn volume_series(&self, query: &MarketQuery) -> StoreResult<MarketSeries<VolumePoint>>;
}
