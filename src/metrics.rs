//! Pipeline observability metrics
//!
//! Stage outcomes are emitted through the `metrics` facade and are cheap when
//! no recorder is installed. [`init_metrics`] installs a Prometheus exporter
//! with a scrape endpoint; without it the counters are simply discarded.
//!
//! [`PipelineStats`] keeps the same outcomes in-process so a run report (and
//! tests) can inspect them without a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::IdKind;

static METRICS_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the Prometheus exporter and describe every metric
///
/// Idempotent: subsequent calls are no-ops.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if METRICS_INITIALIZED.get().is_some() {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics exporter on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "dates_skipped_total",
        Unit::Count,
        "Dates skipped because they were already completed"
    );
    describe_counter!(
        "downloads_completed_total",
        Unit::Count,
        "Daily archives fetched successfully"
    );
    describe_counter!(
        "downloads_failed_total",
        Unit::Count,
        "Daily archives that could not be fetched"
    );
    describe_counter!(
        "days_parsed_total",
        Unit::Count,
        "Daily archives decompressed and parsed"
    );
    describe_counter!(
        "days_parse_failed_total",
        Unit::Count,
        "Daily archives rejected by the parser"
    );
    describe_counter!(
        "days_persisted_total",
        Unit::Count,
        "Days committed to the store"
    );
    describe_counter!(
        "days_persist_failed_total",
        Unit::Count,
        "Days rolled back by the persister"
    );
    describe_counter!(
        "label_lookups_total",
        Unit::Count,
        "Batch label lookups issued"
    );
    describe_counter!(
        "label_bisections_total",
        Unit::Count,
        "Lookup batches split after an unknown-id rejection"
    );
    describe_counter!(
        "unknown_ids_total",
        Unit::Count,
        "Ids labelled with a placeholder"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit permits"
    );
    describe_gauge!(
        "rate_limit_permits_available",
        Unit::Count,
        "Currently available rate limit permits"
    );

    let _ = METRICS_INITIALIZED.set(());
    Ok(())
}

/// Outcome of one unit of work at a stage boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Date already completed in a previous run
    Skipped,
    /// Archive fetched
    Downloaded,
    /// Archive could not be fetched
    DownloadFailed,
    /// Archive parsed into a market day
    Parsed,
    /// Archive rejected by the parser
    ParseFailed,
    /// Day committed
    Persisted,
    /// Day rolled back
    PersistFailed,
}

impl StageEvent {
    fn metric_name(self) -> &'static str {
        match self {
            StageEvent::Skipped => "dates_skipped_total",
            StageEvent::Downloaded => "downloads_completed_total",
            StageEvent::DownloadFailed => "downloads_failed_total",
            StageEvent::Parsed => "days_parsed_total",
            StageEvent::ParseFailed => "days_parse_failed_total",
            StageEvent::Persisted => "days_persisted_total",
            StageEvent::PersistFailed => "days_persist_failed_total",
        }
    }
}

/// In-process counters for one pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    skipped: AtomicU64,
    downloaded: AtomicU64,
    download_failed: AtomicU64,
    parsed: AtomicU64,
    parse_failed: AtomicU64,
    persisted: AtomicU64,
    persist_failed: AtomicU64,
}

impl PipelineStats {
    /// Record a stage outcome both locally and through the metrics facade
    pub fn record(&self, event: StageEvent) {
        let slot = match event {
            StageEvent::Skipped => &self.skipped,
            StageEvent::Downloaded => &self.downloaded,
            StageEvent::DownloadFailed => &self.download_failed,
            StageEvent::Parsed => &self.parsed,
            StageEvent::ParseFailed => &self.parse_failed,
            StageEvent::Persisted => &self.persisted,
            StageEvent::PersistFailed => &self.persist_failed,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!(event.metric_name()).increment(1);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            skipped: self.skipped.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            download_failed: self.download_failed.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            parse_failed: self.parse_failed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Dates skipped as already completed
    pub skipped: u64,
    /// Archives fetched
    pub downloaded: u64,
    /// Archives not fetched
    pub download_failed: u64,
    /// Archives parsed
    pub parsed: u64,
    /// Archives rejected
    pub parse_failed: u64,
    /// Days committed
    pub persisted: u64,
    /// Days rolled back
    pub persist_failed: u64,
}

/// Record one batch lookup against the label service
pub fn record_label_lookup(kind: IdKind, batch_size: usize) {
    counter!("label_lookups_total", "kind" => kind.to_string()).increment(1);
    histogram!("label_lookup_batch_size", "kind" => kind.to_string()).record(batch_size as f64);
}

/// Record a batch split after an unknown-id rejection
pub fn record_bisection(kind: IdKind) {
    counter!("label_bisections_total", "kind" => kind.to_string()).increment(1);
}

/// Record an id that received a placeholder label
pub fn record_unknown_id(kind: IdKind) {
    counter!("unknown_ids_total", "kind" => kind.to_string()).increment(1);
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics {
    limiter: &'static str,
    start_time: Option<Instant>,
}

impl RateLimiterMetrics {
    /// Create a helper for the named limiter
    pub fn new(limiter: &'static str) -> Self {
        Self {
            limiter,
            start_time: None,
        }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record successful permit acquisition
    pub fn record_acquired(&mut self) {
        if let Some(start) = self.start_time.take() {
            let wait = start.elapsed();
            histogram!("rate_limit_queue_wait_seconds", "limiter" => self.limiter)
                .record(wait.as_secs_f64());

            if wait.as_millis() > 100 {
                debug!(
                    limiter = self.limiter,
                    wait_ms = wait.as_millis(),
                    "Rate limit permit acquired after wait"
                );
            }
        }
    }

    /// Update available permits gauge
    pub fn update_available_permits(&self, available: usize) {
        gauge!("rate_limit_permits_available", "limiter" => self.limiter).set(available as f64);
    }
}
