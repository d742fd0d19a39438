//! Per-day persistence
//!
//! [`Persister::persist_day`] resolves a day's region and type labels, writes
//! any labels the store has not seen, then commits the day's rows together
//! with its completion marker. A failure at any step leaves the day
//! incomplete; it is retried by the next run.

use std::sync::Arc;
use tracing::debug;

use crate::identifier::{IdResolver, ResolveError};
use crate::store::{MarketStore, StoreError};
use crate::{IdKind, MarketDay, NumericId};

pub mod stage;

pub use stage::PersistStage;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Label resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Store rejected a write
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Writes market days through a shared store and resolver
pub struct Persister {
    store: Arc<dyn MarketStore>,
    resolver: Arc<IdResolver>,
}

impl Persister {
    /// Create a persister
    pub fn new(store: Arc<dyn MarketStore>, resolver: Arc<IdResolver>) -> Self {
        Self { store, resolver }
    }

    /// Label and store one day
    pub async fn persist_day(&self, day: &MarketDay) -> Result<(), PersistError> {
        for kind in IdKind::ALL {
            self.persist_labels(kind, day).await?;
        }

        self.store.insert_day(day).await?;
        Ok(())
    }

    async fn persist_labels(&self, kind: IdKind, day: &MarketDay) -> Result<(), PersistError> {
        let ids: Vec<NumericId> = day.distinct_ids(kind).into_iter().collect();
        let resolution = self.resolver.resolve_many(kind, &ids).await?;
        if resolution.unsaved.is_empty() {
            return Ok(());
        }

        let unsaved: Vec<(NumericId, String)> = resolution.unsaved.into_iter().collect();
        self.store.upsert_labels(kind, &unsaved).await?;
        self.resolver
            .mark_persisted(kind, unsaved.iter().map(|(id, _)| *id));
        debug!(date = %day.date, %kind, count = unsaved.len(), "New labels stored");
        Ok(())
    }
}
