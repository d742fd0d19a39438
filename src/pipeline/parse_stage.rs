//! Parse worker pool

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::WorkQueue;
use crate::fetcher::{parse_day, RawDayBlob};
use crate::metrics::{PipelineStats, StageEvent};
use crate::MarketDay;

/// Decompresses and parses downloaded archives
pub struct ParseStage {
    stats: Arc<PipelineStats>,
}

impl ParseStage {
    /// Create a parse stage
    pub fn new(stats: Arc<PipelineStats>) -> Self {
        Self { stats }
    }

    /// Parse one archive on the blocking pool
    ///
    /// Returns `None` if the file is rejected; the rejection is logged.
    pub async fn parse(&self, blob: RawDayBlob) -> Option<MarketDay> {
        let date = blob.date;
        match tokio::task::spawn_blocking(move || parse_day(&blob)).await {
            Ok(Ok(day)) => {
                debug!(%date, records = day.len(), "Archive parsed");
                self.stats.record(StageEvent::Parsed);
                Some(day)
            }
            Ok(Err(e)) => {
                warn!(%date, error = %e, "Archive rejected; date left for the next run");
                self.stats.record(StageEvent::ParseFailed);
                None
            }
            Err(e) => {
                error!(%date, error = %e, "Parse task panicked");
                self.stats.record(StageEvent::ParseFailed);
                None
            }
        }
    }

    /// Spawn `workers` tasks draining `input` into `output`
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        input: WorkQueue<RawDayBlob>,
        output: mpsc::Sender<MarketDay>,
    ) -> Vec<JoinHandle<()>> {
        info!(workers, "Starting parse workers");
        (0..workers)
            .map(|worker_id| {
                let stage = Arc::clone(self);
                let input = input.clone();
                let output = output.clone();
                tokio::spawn(async move {
                    while let Some(blob) = input.recv().await {
                        if let Some(day) = stage.parse(blob).await {
                            if output.send(day).await.is_err() {
                                warn!(worker_id, "Persist queue closed, stopping parse worker");
                                break;
                            }
                        }
                    }
                    debug!(worker_id, "Parse worker finished");
                })
            })
            .collect()
    }
}
