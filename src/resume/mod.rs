//! Resume capability across runs
//!
//! The store's completion markers are the only resume state. They are read
//! once at startup into an [`ExclusionSet`] that the download stage consults
//! before fetching a date.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::info;

use crate::store::{MarketStore, StoreResult};

/// Dates that are already fully persisted
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    dates: HashSet<NaiveDate>,
}

impl ExclusionSet {
    /// Build from an explicit list of completed dates
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Load every completed date from the store
    pub async fn load(store: &dyn MarketStore) -> StoreResult<Self> {
        let set = Self::from_dates(store.completed_dates().await?);
        info!(completed = set.len(), "Loaded completed dates");
        Ok(set)
    }

    /// Whether `date` was completed in a previous run
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    /// Number of excluded dates
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether nothing is excluded
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}
