//! Error types for the invocation bridge.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A failure reported by the remote runtime, normalised at the boundary.
///
/// The runtime reports errors in several shapes (structured objects,
/// JSON-encoded strings, bare codes); all of them decode into this one.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("remote error {code}: {}", .message.as_deref().unwrap_or("no message"))]
pub struct RemoteError {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: Option<String>) -> Self {
        Self {
            code: code.into(),
            message,
            raw: None,
        }
    }
}

/// Errors surfaced by [`crate::Bridge::call`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The runtime answered with an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The runtime refused the invocation itself.
    #[error("invocation failed: {0}")]
    Invoke(String),

    /// The payload could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The pending call was dropped before any callback settled it.
    #[error("call {0} abandoned before completion")]
    Abandoned(u64),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
