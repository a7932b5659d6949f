//! # fieldsync Sync
//!
//! The two pipelines between the local store and the cloud.
//!
//! - [`OutboundQueue`] - journals local edits and drains them through the
//!   dispatcher in bounded batches, one drain at a time
//! - [`InboundProcessor`] - subscribes to cloud updates past the watermark,
//!   delivers only the newer fields and advances the watermark as batch
//!   groups complete
//!
//! Both talk to the local runtime through [`fieldsync_bridge::Dispatch`], so
//! they can be driven by a [`fieldsync_bridge::Bridge`] or by a test double.
//!
//! ## Failure policy
//!
//! A batch counts as delivered only when the runtime confirms it; a refusal
//! is treated like a failed call. A failed batch stops its drain loop.
//! Nothing is retried automatically; the unsent tail stays queued until the
//! next trigger.

pub mod config;
pub mod delivery;
pub mod error;
pub mod inbound;
pub mod indicator;
pub mod outbound;
pub mod queue;

#[cfg(test)]
mod test_support;

pub use config::{DeviceScope, InboundConfig, OutboundConfig};
pub use error::{Result, SyncError};
pub use inbound::InboundProcessor;
pub use indicator::ProcessingIndicator;
pub use outbound::OutboundQueue;
pub use queue::{BatchPayload, DrainReport, QueueStats, SyncQueue};
