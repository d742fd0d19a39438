//! Batch label lookup service

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::downloader::rate_limit::{RateLimitError, RateLimiter};
use crate::NumericId;

/// Largest batch the lookup service accepts
pub const MAX_LOOKUP_BATCH: usize = 1000;

/// Default lookup endpoint
pub const DEFAULT_LOOKUP_ENDPOINT: &str = "https://esi.evetech.net/latest/universe/names/";

/// Characters of an error body kept in [`LookupError::Server`]
const MAX_ERROR_BODY_CHARS: usize = 512;

/// One resolved id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    /// Numeric id
    pub id: NumericId,
    /// Display name
    pub name: String,
    /// Service-side category ("region", "inventory_type", ...)
    #[serde(default)]
    pub category: String,
}

/// Lookup errors
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The batch contains at least one id the service does not know
    #[error("batch contains an unknown id")]
    UnknownId,

    /// Request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// Any non-success status other than the unknown-id rejection
    #[error("lookup service returned {status}: {body}")]
    Server {
        /// HTTP status
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response body was not the expected JSON
    #[error("failed to decode lookup response: {0}")]
    Decode(String),

    /// Rate limiter closed
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

/// Batch id-to-label service
#[async_trait]
pub trait LabelLookup: Send + Sync {
    /// Resolve up to [`MAX_LOOKUP_BATCH`] ids in one call
    ///
    /// Fails with [`LookupError::UnknownId`] if any id in the batch is
    /// unknown; no partial result is returned in that case.
    async fn lookup(&self, ids: &[NumericId]) -> Result<Vec<LabelEntry>, LookupError>;
}

/// HTTP lookup against the ESI `universe/names` endpoint
#[derive(Debug, Clone)]
pub struct EsiNameLookup {
    client: Arc<Client>,
    endpoint: String,
    limiter: RateLimiter,
}

impl EsiNameLookup {
    /// Create a lookup sharing `client`, throttled by `limiter`
    pub fn new(client: Arc<Client>, endpoint: impl Into<String>, limiter: RateLimiter) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            limiter,
        }
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LabelLookup for EsiNameLookup {
    async fn lookup(&self, ids: &[NumericId]) -> Result<Vec<LabelEntry>, LookupError> {
        self.limiter.acquire().await?;
        debug!(batch = ids.len(), "Submitting label lookup");

        let response = self
            .client
            .post(&self.endpoint)
            .json(ids)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Vec<LabelEntry>>()
                .await
                .map_err(|e| LookupError::Decode(e.to_string())),
            StatusCode::NOT_FOUND => Err(LookupError::UnknownId),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(LookupError::Server {
                    status: status.as_u16(),
                    body: truncate_body(&text),
                })
            }
        }
    }
}

/// Keep at most [`MAX_ERROR_BODY_CHARS`] characters, cut on a char boundary
fn truncate_body(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
