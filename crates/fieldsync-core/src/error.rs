//! Error types for fieldsync Core.

use thiserror::Error;

/// Errors raised while decoding or validating sync data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },

    #[error("invalid record edit: {0}")]
    InvalidEdit(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("decoding error: {0}")]
    Decoding(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
