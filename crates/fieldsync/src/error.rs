//! Error types for the engine.

use thiserror::Error;

use fieldsync_bridge::BridgeError;
use fieldsync_cloud::CloudError;
use fieldsync_core::CoreError;
use fieldsync_store::StoreError;
use fieldsync_sync::SyncError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A sync pipeline failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A call through the bridge failed.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The cloud store failed.
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// The local state store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Input failed validation.
    #[error("invalid input: {0}")]
    Invalid(#[from] CoreError),

    /// JSON encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The engine did not finish starting in time.
    #[error("engine not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    /// No action with this name.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Action options could not be decoded.
    #[error("invalid options for {action}: {reason}")]
    InvalidOptions { action: String, reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
