//! Shared HTTP client
//!
//! One `reqwest::Client` is built per pipeline and handed to both the archive
//! fetcher and the label lookup so they share a connection pool.

use reqwest::Client;
use std::time::Duration;

use super::{FetcherError, FetcherResult};

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for one archive download
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Build a client with explicit timeouts
pub fn build_http_client(connect_timeout: Duration, request_timeout: Duration) -> FetcherResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetcherError::ClientConfig(format!("failed to build HTTP client: {e}")))
}
