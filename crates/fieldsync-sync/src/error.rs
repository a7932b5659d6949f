//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur in the sync pipelines.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A call through the bridge failed.
    #[error("bridge error: {0}")]
    Bridge(#[from] fieldsync_bridge::BridgeError),

    /// The cloud store failed.
    #[error("cloud error: {0}")]
    Cloud(#[from] fieldsync_cloud::CloudError),

    /// The local state store failed.
    #[error("store error: {0}")]
    Store(#[from] fieldsync_store::StoreError),

    /// The runtime answered but did not confirm the batch.
    #[error("batch refused: {0}")]
    Refused(String),

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Invalid(#[from] fieldsync_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
