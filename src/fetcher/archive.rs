//! Daily market history archive fetcher
//!
//! Archives live at
//! `{base}/{yyyy}/{prefix}-{yyyy-mm-dd}.{ext}`, one bzip2-compressed CSV per
//! completed UTC day.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use super::{DayFetcher, FetcherError, FetcherResult};

/// Default archive host
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://data.everef.net/market-history";
/// Default file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "market-history";
/// Default file extension
pub const DEFAULT_FILE_EXTENSION: &str = "csv.bz2";

/// Canonical archive URL for a date
///
/// ```
/// use chrono::NaiveDate;
/// use market_history_ingest::fetcher::archive_url;
///
/// let date = NaiveDate::from_ymd_opt(2003, 10, 1).unwrap();
/// assert_eq!(
///     archive_url("https://data.everef.net/market-history", "market-history", "csv.bz2", date),
///     "https://data.everef.net/market-history/2003/market-history-2003-10-01.csv.bz2"
/// );
/// ```
pub fn archive_url(base: &str, prefix: &str, extension: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/{}-{}.{}",
        base.trim_end_matches('/'),
        date.year(),
        prefix,
        date.format("%Y-%m-%d"),
        extension
    )
}

/// HTTP implementation of [`DayFetcher`]
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    client: Arc<Client>,
    base_url: String,
    prefix: String,
    extension: String,
}

impl HttpArchiveFetcher {
    /// Create a fetcher against a custom host (mirrors, tests)
    pub fn with_base_url(client: Arc<Client>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            prefix: DEFAULT_FILE_PREFIX.to_string(),
            extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }

    /// Override the file naming scheme
    pub fn with_file_naming(mut self, prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.extension = extension.into();
        self
    }

    /// URL this fetcher requests for `date`
    pub fn url_for(&self, date: NaiveDate) -> String {
        archive_url(&self.base_url, &self.prefix, &self.extension, date)
    }
}

#[async_trait]
impl DayFetcher for HttpArchiveFetcher {
    async fn fetch_day(&self, date: NaiveDate) -> FetcherResult<Bytes> {
        let url = self.url_for(date);
        debug!(%date, %url, "Downloading archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetcherError::HttpError {
                status: status.as_u16(),
                url,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetcherError::NetworkError(e.to_string()))?;

        debug!(%date, bytes = bytes.len(), "Archive downloaded");
        Ok(bytes)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
