//! # Market History Ingest Library
//!
//! Incrementally ingests the daily market history archives published by an
//! external provider into a relational store. Every calendar day from the
//! provider's first published day up to (not including) today is fetched,
//! decompressed, parsed, labelled and persisted exactly once across runs.
//!
//! ## Features
//!
//! - **Resumable**: completed days are recorded in the store and excluded from
//!   subsequent runs
//! - **Rate Limiting**: token-bucket throttling on every network-calling stage
//! - **Backpressure**: stages are joined by bounded queues, so slow persistence
//!   throttles fetching
//! - **Batch-tolerant label resolution**: numeric region/type ids are resolved
//!   through a batch lookup API that rejects a whole batch for one unknown id;
//!   rejected batches are bisected until the unknown ids are isolated
//! - **All-or-nothing days**: a day's rows become visible in a single
//!   transaction together with its completion marker
//!
//! ## Quick Start
//!
//! ```no_run
//! use market_history_ingest::pipeline::{IngestConfig, Pipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::default();
//! let pipeline = Pipeline::connect(config).await?;
//! let report = pipeline.run().await?;
//! println!("persisted {} days", report.persisted.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`dates`] - Ordered, gap-free sequencing of pending calendar dates
//! - [`downloader`] - Rate limiter and the download worker pool
//! - [`fetcher`] - Remote archive access and history file parsing
//! - [`identifier`] - Region/type label resolution with bisection
//! - [`store`] - Durable storage of days, labels and completion markers
//! - [`persister`] - Per-day persistence worker pool
//! - [`pipeline`] - Queue wiring, configuration and run orchestration
//! - [`resume`] - Exclusion of already-completed days

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Calendar date sequencing and clocks
pub mod dates;

/// Download stage and rate limiting
pub mod downloader;

/// Remote archive fetching and parsing
pub mod fetcher;

/// Identifier label resolution
pub mod identifier;

/// Observability metrics
pub mod metrics;

/// Persistence stage
pub mod persister;

/// Pipeline wiring and configuration
pub mod pipeline;

/// Resume support (completed-date exclusion)
pub mod resume;

/// Graceful shutdown coordination shared across stages
pub mod shutdown;

/// Durable storage
pub mod store;

/// Numeric identifier of a region or an item type.
pub type NumericId = u32;

/// Namespace of a numeric identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdKind {
    /// Market region id
    #[serde(rename = "region")]
    Region,
    /// Item type id
    #[serde(rename = "type")]
    Type,
}

impl IdKind {
    /// Both namespaces, in the order the persister resolves them
    pub const ALL: [IdKind; 2] = [IdKind::Region, IdKind::Type];
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdKind::Region => "region",
            IdKind::Type => "type",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IdKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "region" => Ok(IdKind::Region),
            "type" => Ok(IdKind::Type),
            _ => Err(format!("Invalid id kind: {s}. Valid options: region, type")),
        }
    }
}

/// One region/type price and volume statistic for one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordRow {
    /// Trading day
    pub date: NaiveDate,
    /// Region the statistic was recorded in
    pub region_id: NumericId,
    /// Item type traded
    pub type_id: NumericId,
    /// Average traded price
    pub average: Decimal,
    /// Highest traded price
    pub highest: Decimal,
    /// Lowest traded price
    pub lowest: Decimal,
    /// Units traded
    pub volume: u64,
    /// Number of orders filled
    pub order_count: u64,
}

impl RecordRow {
    /// Validate record data integrity
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("average", self.average),
            ("highest", self.highest),
            ("lowest", self.lowest),
        ] {
            if value < Decimal::ZERO {
                return Err(format!("{name} must be non-negative, got {value}"));
            }
        }

        if self.lowest > self.highest {
            return Err(format!(
                "Lowest ({}) must be <= highest ({})",
                self.lowest, self.highest
            ));
        }

        Ok(())
    }

    /// The (region, type) pair that must be unique within a day
    pub fn key(&self) -> (NumericId, NumericId) {
        (self.region_id, self.type_id)
    }
}

/// A calendar date together with all of its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDay {
    /// The day the records belong to
    pub date: NaiveDate,
    /// Records in file order
    pub records: Vec<RecordRow>,
}

impl MarketDay {
    /// Create a market day
    pub fn new(date: NaiveDate, records: Vec<RecordRow>) -> Self {
        Self { date, records }
    }

    /// Distinct ids of the given namespace referenced by this day
    pub fn distinct_ids(&self, kind: IdKind) -> BTreeSet<NumericId> {
        self.records
            .iter()
            .map(|r| match kind {
                IdKind::Region => r.region_id,
                IdKind::Type => r.type_id,
            })
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the day has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
