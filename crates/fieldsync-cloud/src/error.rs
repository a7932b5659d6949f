//! Error types for the cloud store.

use thiserror::Error;

/// Errors that can occur talking to the cloud document store.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    /// The store could not be reached.
    #[error("cloud store unavailable: {0}")]
    Unavailable(String),

    /// A path that does not name a document or collection.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A write was rejected.
    #[error("write to {path} failed: {reason}")]
    Write { path: String, reason: String },

    /// The change stream failed; it delivers nothing further.
    #[error("subscription error: {0}")]
    Stream(String),

    /// A document could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for CloudError {
    fn from(e: serde_json::Error) -> Self {
        CloudError::Encoding(e.to_string())
    }
}

/// Result type for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
