//! Remote archive access and history file parsing

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;

pub mod archive;
pub mod history_parser;
pub mod shared_resources;

pub use archive::{archive_url, HttpArchiveFetcher};
pub use history_parser::{parse_day, ParseError};

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status
    #[error("HTTP error: {status} for {url}")]
    HttpError {
        /// Status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Transport failure (connect, timeout, truncated body)
    #[error("network error: {0}")]
    NetworkError(String),

    /// HTTP client could not be constructed
    #[error("client configuration error: {0}")]
    ClientConfig(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Compressed archive bytes for one calendar date
#[derive(Debug, Clone)]
pub struct RawDayBlob {
    /// Date the archive belongs to
    pub date: NaiveDate,
    /// Compressed payload exactly as served
    pub bytes: Bytes,
}

/// Source of daily archives
#[async_trait]
pub trait DayFetcher: Send + Sync {
    /// Fetch the compressed archive for `date`
    ///
    /// Any transport failure or non-success status is an error; the caller
    /// decides whether to drop or retry the date.
    async fn fetch_day(&self, date: NaiveDate) -> FetcherResult<Bytes>;

    /// Base URL archives are fetched from
    fn base_url(&self) -> &str;
}
