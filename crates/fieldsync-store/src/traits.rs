//! The state store trait.

use async_trait::async_trait;

use fieldsync_core::{RecordEdit, Timestamp};

use crate::error::Result;

/// Durable per-device sync state.
///
/// Holds the last confirmed watermark and the journal of outbound edits that
/// have been accepted locally but not yet acknowledged by the cloud side.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// The stored watermark, `None` if never saved.
    async fn load_watermark(&self, device_id: &str) -> Result<Option<Timestamp>>;

    /// Store `at` unless an equal or newer watermark is already stored.
    ///
    /// Returns the watermark in effect afterwards.
    async fn save_watermark(&self, device_id: &str, at: Timestamp) -> Result<Timestamp>;

    /// Append edits to the tail of the journal, preserving order.
    async fn append_pending(&self, device_id: &str, edits: &[RecordEdit]) -> Result<()>;

    /// All journaled edits, oldest first.
    async fn pending(&self, device_id: &str) -> Result<Vec<RecordEdit>>;

    /// Drop the oldest `count` journaled edits. Returns how many were dropped.
    async fn remove_pending(&self, device_id: &str, count: usize) -> Result<usize>;
}
