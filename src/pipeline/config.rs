//! Pipeline configuration

use std::time::Duration;

use crate::downloader::config::{DEFAULT_DOWNLOAD_RATE, DEFAULT_DOWNLOAD_WORKERS, DEFAULT_LOOKUP_RATE};
use crate::fetcher::archive::{DEFAULT_ARCHIVE_BASE_URL, DEFAULT_FILE_EXTENSION, DEFAULT_FILE_PREFIX};
use crate::fetcher::shared_resources::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};
use crate::identifier::lookup::{DEFAULT_LOOKUP_ENDPOINT, MAX_LOOKUP_BATCH};
use crate::store::DEFAULT_DATABASE_URL;

/// Default number of parse workers
pub const DEFAULT_PARSE_WORKERS: usize = 4;
/// Default number of persist workers
pub const DEFAULT_PERSIST_WORKERS: usize = 4;
/// Default capacity of each inter-stage queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting is outside its valid range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Every tunable of an ingestion run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Concurrent archive downloads
    pub download_workers: usize,
    /// Concurrent archive parses
    pub parse_workers: usize,
    /// Concurrent day writes
    pub persist_workers: usize,
    /// Capacity of each queue between stages
    pub queue_capacity: usize,
    /// Archive requests per second
    pub download_rate: usize,
    /// Label lookups per second
    pub lookup_rate: usize,
    /// Ids per label lookup (at most 1000)
    pub lookup_max_batch: usize,
    /// Archive host, without trailing year directory
    pub archive_base_url: String,
    /// Archive file name prefix
    pub file_prefix: String,
    /// Archive file extension
    pub file_extension: String,
    /// Label lookup endpoint
    pub lookup_endpoint: String,
    /// Store location
    pub database_url: String,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            download_workers: DEFAULT_DOWNLOAD_WORKERS,
            parse_workers: DEFAULT_PARSE_WORKERS,
            persist_workers: DEFAULT_PERSIST_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            download_rate: DEFAULT_DOWNLOAD_RATE,
            lookup_rate: DEFAULT_LOOKUP_RATE,
            lookup_max_batch: MAX_LOOKUP_BATCH,
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            lookup_endpoint: DEFAULT_LOOKUP_ENDPOINT.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl IngestConfig {
    /// Reject settings no pipeline can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("download_workers", self.download_workers),
            ("parse_workers", self.parse_workers),
            ("persist_workers", self.persist_workers),
            ("queue_capacity", self.queue_capacity),
            ("download_rate", self.download_rate),
            ("lookup_rate", self.lookup_rate),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if !(1..=MAX_LOOKUP_BATCH).contains(&self.lookup_max_batch) {
            return Err(ConfigError::Invalid {
                field: "lookup_max_batch",
                reason: format!("must be between 1 and {MAX_LOOKUP_BATCH}, got {}", self.lookup_max_batch),
            });
        }

        for (field, value) in [
            ("archive_base_url", &self.archive_base_url),
            ("lookup_endpoint", &self.lookup_endpoint),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("expected an http(s) URL, got {value:?}"),
                });
            }
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(ConfigError::Invalid {
                field: "database_url",
                reason: format!("expected a sqlite: URL, got {:?}", self.database_url),
            });
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "HTTP timeouts must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}
