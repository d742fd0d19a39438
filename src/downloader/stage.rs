//! Download worker pool

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DownloadError, RateLimiter};
use crate::fetcher::{DayFetcher, RawDayBlob};
use crate::metrics::{PipelineStats, StageEvent};
use crate::pipeline::queue::WorkQueue;
use crate::resume::ExclusionSet;

/// Fetches archives for pending dates
pub struct DownloadStage {
    fetcher: Arc<dyn DayFetcher>,
    limiter: RateLimiter,
    exclusions: Arc<ExclusionSet>,
    stats: Arc<PipelineStats>,
}

impl DownloadStage {
    /// Create a stage sharing one limiter across all of its workers
    pub fn new(
        fetcher: Arc<dyn DayFetcher>,
        limiter: RateLimiter,
        exclusions: Arc<ExclusionSet>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            exclusions,
            stats,
        }
    }

    /// Download one date
    ///
    /// Returns `Ok(None)` without touching the network or the limiter if the
    /// date is already completed.
    pub async fn download(&self, date: NaiveDate) -> Result<Option<RawDayBlob>, DownloadError> {
        if self.exclusions.contains(date) {
            debug!(%date, "Already completed, skipping");
            self.stats.record(StageEvent::Skipped);
            return Ok(None);
        }

        self.limiter.acquire().await?;

        match self.fetcher.fetch_day(date).await {
            Ok(bytes) => {
                self.stats.record(StageEvent::Downloaded);
                Ok(Some(RawDayBlob { date, bytes }))
            }
            Err(e) => {
                self.stats.record(StageEvent::DownloadFailed);
                Err(e.into())
            }
        }
    }

    /// Spawn `workers` tasks draining `input` into `output`
    ///
    /// Each worker holds its own clone of `output`, so the parse queue closes
    /// once the last worker exits.
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        input: WorkQueue<NaiveDate>,
        output: mpsc::Sender<RawDayBlob>,
    ) -> Vec<JoinHandle<()>> {
        info!(workers, "Starting download workers");
        (0..workers)
            .map(|worker_id| {
                let stage = Arc::clone(self);
                let input = input.clone();
                let output = output.clone();
                tokio::spawn(async move { stage.run_worker(worker_id, input, output).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize, input: WorkQueue<NaiveDate>, output: mpsc::Sender<RawDayBlob>) {
        while let Some(date) = input.recv().await {
            match self.download(date).await {
                Ok(Some(blob)) => {
                    if output.send(blob).await.is_err() {
                        warn!(worker_id, %date, "Parse queue closed, stopping download worker");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id, %date, error = %e, "Download failed; date left for the next run");
                }
            }
        }
        debug!(worker_id, "Download worker finished");
    }
}
