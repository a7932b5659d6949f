//! # fieldsync Bridge
//!
//! Awaitable calls into a host runtime whose only primitives are a one-way
//! `invoke(script, parameter)` and an out-of-band `callback(text)`.
//!
//! ## How a call flows
//!
//! ```text
//! caller            Bridge                        Runtime
//!   |-- call ------->| probe (100ms x 2s)           |
//!   |                | register id in table         |
//!   |                |-- invoke(webhook, envelope)->|
//!   |                |<------------- callback(json)-|
//!   |<-- Result -----| settle + remove id           |
//! ```
//!
//! If no runtime shows up within the probe bound, the [`MockResponder`]
//! answers instead. Fire-and-forget calls never surface a failure.

pub mod bridge;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod runtime;

pub use bridge::{Bridge, BridgeConfig, CallOptions, Dispatch, WeakBridge};
pub use correlation::{CorrelationTable, Settlement};
pub use envelope::{normalize_error, CallEnvelope, Callback};
pub use error::{BridgeError, RemoteError, Result};
pub use mock::{MockResponder, INBOUND_DISPATCH_SCRIPT, OUTBOUND_DISPATCH_SCRIPT};
pub use runtime::{
    Runtime, RuntimeSlot, RETURN_RESULT_SCRIPT, UPLOAD_COMPLETE_SCRIPT, WEBHOOK_SCRIPT,
};
