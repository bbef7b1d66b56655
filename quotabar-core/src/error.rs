//! Core error types for `QuotaBar`.

use thiserror::Error;

/// Core error type for `QuotaBar` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Provider name could not be resolved.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Invalid data from an upstream payload.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
