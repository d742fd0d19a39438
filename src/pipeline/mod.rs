//! Pipeline wiring and run orchestration
//!
//! A run connects four stages with bounded queues:
//!
//! ```text
//! dates -> [download x W] -> blobs -> [parse x W] -> days -> [persist x W] -> results
//! ```
//!
//! The date producer stops once it reaches today (or on shutdown) and closes
//! the first queue. Each pool exits when its input queue is closed and empty,
//! which closes the next queue in turn. [`Pipeline::run`] returns once the
//! last persist worker has exited.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::dates::{Clock, DateSequencer, SystemClock};
use crate::downloader::{DownloadStage, RateLimiter};
use crate::fetcher::shared_resources::build_http_client;
use crate::fetcher::{DayFetcher, FetcherError, HttpArchiveFetcher};
use crate::identifier::{EsiNameLookup, IdResolver, LabelLookup};
use crate::metrics::{PipelineStats, StatsSnapshot};
use crate::persister::{PersistStage, Persister};
use crate::resume::ExclusionSet;
use crate::shutdown::ShutdownSignal;
use crate::store::{MarketStore, SqliteMarketStore, StoreError};
use crate::IdKind;

pub mod config;
pub mod parse_stage;
pub mod queue;

pub use config::{ConfigError, IngestConfig};
pub use parse_stage::ParseStage;
pub use queue::{work_queue, WorkQueue};

/// Startup failures; nothing has been fetched or written when one occurs
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A required collaborator was not supplied
    #[error("configuration error: missing {0}")]
    MissingCollaborator(&'static str),

    /// Store unreachable or unreadable at startup
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// HTTP client could not be built
    #[error("HTTP client unavailable: {0}")]
    Http(#[from] FetcherError),
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Dates committed by this run, ascending
    pub persisted: Vec<NaiveDate>,
    /// Stage counters
    pub stats: StatsSnapshot,
}

/// Builder for [`Pipeline`] with injectable collaborators
pub struct PipelineBuilder {
    config: IngestConfig,
    fetcher: Option<Arc<dyn DayFetcher>>,
    lookup: Option<Arc<dyn LabelLookup>>,
    store: Option<Arc<dyn MarketStore>>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
}

impl PipelineBuilder {
    /// Archive source
    pub fn fetcher(mut self, fetcher: Arc<dyn DayFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Label lookup service
    pub fn lookup(mut self, lookup: Arc<dyn LabelLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Persistence backend
    pub fn store(mut self, store: Arc<dyn MarketStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock deciding which dates are complete (defaults to the wall clock)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shutdown signal observed by the date producer
    pub fn shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Validate configuration and collaborators
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;
        Ok(Pipeline {
            fetcher: self.fetcher.ok_or(PipelineError::MissingCollaborator("archive fetcher"))?,
            lookup: self.lookup.ok_or(PipelineError::MissingCollaborator("label lookup"))?,
            store: self.store.ok_or(PipelineError::MissingCollaborator("store"))?,
            clock: self.clock,
            shutdown: self.shutdown,
            config: self.config,
        })
    }
}

/// A configured ingestion run
pub struct Pipeline {
    config: IngestConfig,
    fetcher: Arc<dyn DayFetcher>,
    lookup: Arc<dyn LabelLookup>,
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    /// Start building a pipeline with custom collaborators
    pub fn builder(config: IngestConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            fetcher: None,
            lookup: None,
            store: None,
            clock: Arc::new(SystemClock),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Build the production pipeline: HTTP archive fetcher, HTTP label lookup
    /// and a SQLite store at `config.database_url`
    pub async fn connect(config: IngestConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let client = Arc::new(build_http_client(config.connect_timeout, config.request_timeout)?);
        let fetcher = HttpArchiveFetcher::with_base_url(client.clone(), config.archive_base_url.clone())
            .with_file_naming(config.file_prefix.clone(), config.file_extension.clone());
        let lookup = EsiNameLookup::new(
            client,
            config.lookup_endpoint.clone(),
            RateLimiter::per_second("lookup", config.lookup_rate),
        );
        let store = SqliteMarketStore::connect(&config.database_url).await?;

        Self::builder(config)
            .fetcher(Arc::new(fetcher))
            .lookup(Arc::new(lookup))
            .store(Arc::new(store))
            .build()
    }

    /// Replace the shutdown signal (e.g. with one wired to Ctrl+C)
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Shutdown signal observed by this pipeline
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Store this pipeline writes to
    pub fn store(&self) -> Arc<dyn MarketStore> {
        self.store.clone()
    }

    /// Run until every ready date has been processed
    pub async fn run(self) -> Result<RunReport, PipelineError> {
        self.run_with_progress(|_| {}).await
    }

    /// Run, invoking `on_persisted` for each committed date as it arrives
    pub async fn run_with_progress<F>(self, mut on_persisted: F) -> Result<RunReport, PipelineError>
    where
        F: FnMut(NaiveDate),
    {
        let config = &self.config;
        let stats = Arc::new(PipelineStats::default());

        let exclusions = Arc::new(ExclusionSet::load(self.store.as_ref()).await?);
        let resolver = Arc::new(IdResolver::with_max_batch(
            self.lookup.clone(),
            config.lookup_max_batch,
        ));
        for kind in IdKind::ALL {
            resolver.seed(kind, self.store.labels(kind).await?);
        }

        let download = Arc::new(DownloadStage::new(
            self.fetcher.clone(),
            RateLimiter::per_second("download", config.download_rate),
            exclusions,
            stats.clone(),
        ));
        let parse = Arc::new(ParseStage::new(stats.clone()));
        let persist = Arc::new(PersistStage::new(
            Persister::new(self.store.clone(), resolver),
            stats.clone(),
        ));

        let (date_tx, date_queue) = work_queue(config.queue_capacity);
        let (blob_tx, blob_queue) = work_queue(config.queue_capacity);
        let (day_tx, day_queue) = work_queue(config.queue_capacity);
        let (result_tx, mut result_rx) = mpsc::channel(config.queue_capacity);

        info!(
            download_workers = config.download_workers,
            parse_workers = config.parse_workers,
            persist_workers = config.persist_workers,
            queue_capacity = config.queue_capacity,
            "Starting pipeline"
        );

        let mut handles = vec![tokio::spawn(produce_dates(
            DateSequencer::new(),
            self.clock.clone(),
            date_tx,
            self.shutdown.clone(),
        ))];
        handles.extend(download.spawn_workers(config.download_workers, date_queue, blob_tx));
        handles.extend(parse.spawn_workers(config.parse_workers, blob_queue, day_tx));
        handles.extend(persist.spawn_workers(config.persist_workers, day_queue, result_tx));

        let mut persisted = Vec::new();
        while let Some(date) = result_rx.recv().await {
            on_persisted(date);
            persisted.push(date);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Pipeline task failed");
            }
        }

        persisted.sort();
        let stats = stats.snapshot();
        info!(persisted = persisted.len(), ?stats, "Pipeline finished");
        Ok(RunReport { persisted, stats })
    }
}

/// Queue every ready date in order, then close the queue
async fn produce_dates(
    sequencer: DateSequencer,
    clock: Arc<dyn Clock>,
    output: mpsc::Sender<NaiveDate>,
    shutdown: ShutdownSignal,
) {
    let mut produced = 0u64;
    while !shutdown.is_triggered() && sequencer.is_ready(clock.now()) {
        let date = sequencer.next_date();
        tokio::select! {
            sent = output.send(date) => {
                if sent.is_err() {
                    break;
                }
            }
            _ = shutdown.wait() => break,
        }
        produced += 1;
    }

    if shutdown.is_triggered() {
        info!(produced, "Shutdown requested, no further dates queued");
    } else {
        info!(produced, "All ready dates queued");
    }
}
