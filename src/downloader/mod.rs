//! Download stage and rate limiting
//!
//! The download stage drains the pending date queue with a fixed pool of
//! workers. Each date is checked against the [`ExclusionSet`] of days that
//! are already stored, throttled by a shared [`RateLimiter`], fetched, and
//! handed to the parse stage as a [`RawDayBlob`].
//!
//! Failures are logged and the date is dropped for the current run; it is
//! not marked complete, so the next run fetches it again.
//!
//! # Components
//!
//! - [`stage`] - Download worker pool
//! - [`rate_limit`] - Token-bucket rate limiter shared by network stages
//! - [`config`] - Default rates and worker counts
//!
//! [`ExclusionSet`]: crate::resume::ExclusionSet
//! [`RawDayBlob`]: crate::fetcher::RawDayBlob

pub mod config;
pub mod rate_limit;
pub mod stage;

pub use rate_limit::{RateLimitError, RateLimiter};
pub use stage::DownloadStage;

use crate::fetcher::FetcherError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Rate limit error
    #[error("rate limit error: {0}")]
    RateLimitError(#[from] RateLimitError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),
}
