//! Cached label resolution with batch bisection

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::lookup::{LabelLookup, LookupError, MAX_LOOKUP_BATCH};
use crate::metrics::{record_bisection, record_label_lookup, record_unknown_id};
use crate::{IdKind, NumericId};

/// Resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Lookup failed for a reason other than an unknown id
    #[error("{kind} label lookup failed: {source}")]
    Lookup {
        /// Namespace being resolved
        kind: IdKind,
        /// Underlying failure
        #[source]
        source: LookupError,
    },
}

/// Deterministic label for an id the lookup service does not know
pub fn placeholder_label(id: NumericId) -> String {
    format!("unknownID_{id}")
}

/// Labels for one `resolve_many` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Label for every requested id
    pub labels: BTreeMap<NumericId, String>,
    /// Subset of `labels` not yet confirmed as written to the store
    pub unsaved: BTreeMap<NumericId, String>,
}

#[derive(Debug, Default)]
struct Namespace {
    labels: HashMap<NumericId, String>,
    unsaved: HashSet<NumericId>,
}

#[derive(Debug, Default)]
struct LabelCache {
    regions: Namespace,
    types: Namespace,
}

impl LabelCache {
    fn namespace(&mut self, kind: IdKind) -> &mut Namespace {
        match kind {
            IdKind::Region => &mut self.regions,
            IdKind::Type => &mut self.types,
        }
    }
}

/// Shared id-to-label resolver
///
/// The cache is never evicted. Its mutex is only taken to partition a request
/// into cached and novel ids and to merge fetched labels; lookups run with
/// the lock released.
pub struct IdResolver {
    lookup: Arc<dyn LabelLookup>,
    max_batch: usize,
    cache: Mutex<LabelCache>,
}

impl IdResolver {
    /// Create a resolver with the service's maximum batch size
    pub fn new(lookup: Arc<dyn LabelLookup>) -> Self {
        Self::with_max_batch(lookup, MAX_LOOKUP_BATCH)
    }

    /// Create a resolver with a smaller batch size
    pub fn with_max_batch(lookup: Arc<dyn LabelLookup>, max_batch: usize) -> Self {
        Self {
            lookup,
            max_batch: max_batch.clamp(1, MAX_LOOKUP_BATCH),
            cache: Mutex::new(LabelCache::default()),
        }
    }

    /// Preload labels that are already in the store
    pub fn seed(&self, kind: IdKind, labels: impl IntoIterator<Item = (NumericId, String)>) {
        let mut cache = self.lock();
        let namespace = cache.namespace(kind);
        for (id, label) in labels {
            namespace.labels.entry(id).or_insert(label);
        }
        debug!(%kind, cached = namespace.labels.len(), "Label cache seeded");
    }

    /// Cached label for one id, if any
    pub fn cached(&self, kind: IdKind, id: NumericId) -> Option<String> {
        self.lock().namespace(kind).labels.get(&id).cloned()
    }

    /// Number of cached labels in a namespace
    pub fn cached_len(&self, kind: IdKind) -> usize {
        self.lock().namespace(kind).labels.len()
    }

    /// Resolve every id to a label
    ///
    /// Duplicates collapse, cached ids never reach the network, and unknown
    /// ids resolve to [`placeholder_label`]. Only lookup failures other than
    /// the unknown-id rejection are returned as errors.
    pub async fn resolve_many(&self, kind: IdKind, ids: &[NumericId]) -> Result<Resolution, ResolveError> {
        let requested: BTreeSet<NumericId> = ids.iter().copied().collect();

        let mut resolution = Resolution::default();
        let mut novel = Vec::new();
        {
            let mut cache = self.lock();
            let namespace = cache.namespace(kind);
            for id in requested {
                match namespace.labels.get(&id) {
                    Some(label) => {
                        if namespace.unsaved.contains(&id) {
                            resolution.unsaved.insert(id, label.clone());
                        }
                        resolution.labels.insert(id, label.clone());
                    }
                    None => novel.push(id),
                }
            }
        }

        if novel.is_empty() {
            return Ok(resolution);
        }

        debug!(%kind, novel = novel.len(), cached = resolution.labels.len(), "Resolving labels");
        let fetched = self.fetch_labels(kind, novel).await?;

        let mut cache = self.lock();
        let namespace = cache.namespace(kind);
        for (id, label) in fetched {
            // Another worker may have merged the same id while we were fetching
            if !namespace.labels.contains_key(&id) {
                namespace.labels.insert(id, label);
                namespace.unsaved.insert(id);
            }
            if let Some(label) = namespace.labels.get(&id) {
                if namespace.unsaved.contains(&id) {
                    resolution.unsaved.insert(id, label.clone());
                }
                resolution.labels.insert(id, label.clone());
            }
        }

        Ok(resolution)
    }

    /// Record that labels have been written to the store
    pub fn mark_persisted(&self, kind: IdKind, ids: impl IntoIterator<Item = NumericId>) {
        let mut cache = self.lock();
        let namespace = cache.namespace(kind);
        for id in ids {
            namespace.unsaved.remove(&id);
        }
    }

    /// Look up sorted, deduplicated novel ids, bisecting rejected batches
    async fn fetch_labels(
        &self,
        kind: IdKind,
        novel: Vec<NumericId>,
    ) -> Result<BTreeMap<NumericId, String>, ResolveError> {
        let mut fetched = BTreeMap::new();
        // Work stack of pending batches; popped in ascending id order
        let mut pending: Vec<Vec<NumericId>> = novel
            .chunks(self.max_batch)
            .rev()
            .map(<[NumericId]>::to_vec)
            .collect();

        while let Some(mut batch) = pending.pop() {
            record_label_lookup(kind, batch.len());
            match self.lookup.lookup(&batch).await {
                Ok(entries) => {
                    for entry in entries {
                        if batch.binary_search(&entry.id).is_ok() {
                            fetched.insert(entry.id, entry.name);
                        }
                    }
                    for id in &batch {
                        if !fetched.contains_key(id) {
                            warn!(%kind, id, "Lookup response omitted id; using placeholder");
                            record_unknown_id(kind);
                            fetched.insert(*id, placeholder_label(*id));
                        }
                    }
                }
                Err(LookupError::UnknownId) if batch.len() > 1 => {
                    record_bisection(kind);
                    let upper = batch.split_off(batch.len() / 2);
                    debug!(%kind, lower = batch.len(), upper = upper.len(), "Bisecting rejected batch");
                    pending.push(upper);
                    pending.push(batch);
                }
                Err(LookupError::UnknownId) => {
                    let id = batch[0];
                    debug!(%kind, id, "Unknown id isolated");
                    record_unknown_id(kind);
                    fetched.insert(id, placeholder_label(id));
                }
                Err(source) => return Err(ResolveError::Lookup { kind, source }),
            }
        }

        Ok(fetched)
    }

    fn lock(&self) -> MutexGuard<'_, LabelCache> {
        // Cache entries are inserted whole; a poisoned lock still holds a consistent map
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for IdResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdResolver")
            .field("max_batch", &self.max_batch)
            .finish_non_exhaustive()
    }
}
