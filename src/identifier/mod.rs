//! Region and type label resolution
//!
//! Market rows carry bare numeric ids. [`IdResolver`] maps them to display
//! labels through a process-lifetime cache backed by a batch lookup service.
//! The service rejects an entire batch if any member is unknown, without
//! saying which; the resolver bisects rejected batches until each unknown id
//! is isolated and labelled with a placeholder.

pub mod lookup;
pub mod resolver;

pub use lookup::{EsiNameLookup, LabelEntry, LabelLookup, LookupError, MAX_LOOKUP_BATCH};
pub use resolver::{placeholder_label, IdResolver, Resolution, ResolveError};
