//! Download stage defaults

/// Default archive requests per second.
/// The archive host is a static CDN; a handful of requests per second keeps
/// the initial backfill of several thousand days under an hour.
pub const DEFAULT_DOWNLOAD_RATE: usize = 5;

/// Default label lookups per second.
pub const DEFAULT_LOOKUP_RATE: usize = 10;

/// Default number of concurrent download workers.
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 4;
