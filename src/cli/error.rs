//! CLI error types and conversions

use crate::pipeline::PipelineError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Pipeline could not start
    #[error("pipeline error: {0}")]
    PipelineError(#[from] PipelineError),

    /// Store error
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// Output could not be serialized
    #[error("output error: {0}")]
    OutputError(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
