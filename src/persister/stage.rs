//! Persist worker pool

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Persister;
use crate::metrics::{PipelineStats, StageEvent};
use crate::pipeline::queue::WorkQueue;
use crate::MarketDay;

/// Drains parsed days into the store
pub struct PersistStage {
    persister: Persister,
    stats: Arc<PipelineStats>,
}

impl PersistStage {
    /// Create a persist stage
    pub fn new(persister: Persister, stats: Arc<PipelineStats>) -> Self {
        Self { persister, stats }
    }

    /// Persist one day, returning its date on commit
    pub async fn persist(&self, day: MarketDay) -> Option<NaiveDate> {
        match self.persister.persist_day(&day).await {
            Ok(()) => {
                info!(date = %day.date, records = day.len(), "Day persisted");
                self.stats.record(StageEvent::Persisted);
                Some(day.date)
            }
            Err(e) => {
                warn!(date = %day.date, error = %e, "Persist failed; date left for the next run");
                self.stats.record(StageEvent::PersistFailed);
                None
            }
        }
    }

    /// Spawn `workers` tasks draining `input`; committed dates go to `results`
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        input: WorkQueue<MarketDay>,
        results: mpsc::Sender<NaiveDate>,
    ) -> Vec<JoinHandle<()>> {
        info!(workers, "Starting persist workers");
        (0..workers)
            .map(|worker_id| {
                let stage = Arc::clone(self);
                let input = input.clone();
                let results = results.clone();
                tokio::spawn(async move {
                    while let Some(day) = input.recv().await {
                        if let Some(date) = stage.persist(day).await {
                            if results.send(date).await.is_err() {
                                debug!(worker_id, %date, "Results receiver dropped");
                            }
                        }
                    }
                    debug!(worker_id, "Persist worker finished");
                })
            })
            .collect()
    }
}
