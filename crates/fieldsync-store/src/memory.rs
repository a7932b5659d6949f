//! In-memory implementation of the StateStore trait.
//!
//! Same semantics as SQLite, nothing survives the process.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use fieldsync_core::{RecordEdit, Timestamp};

use crate::error::Result;
use crate::traits::StateStore;

/// In-memory state store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: RwLock<MemoryStateInner>,
}

#[derive(Default)]
struct MemoryStateInner {
    watermarks: HashMap<String, Timestamp>,
    journals: HashMap<String, VecDeque<RecordEdit>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_watermark(&self, device_id: &str) -> Result<Option<Timestamp>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.watermarks.get(device_id).copied())
    }

    async fn save_watermark(&self, device_id: &str, at: Timestamp) -> Result<Timestamp> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let stored = inner
            .watermarks
            .entry(device_id.to_string())
            .or_insert(at);
        *stored = (*stored).max(at);
        Ok(*stored)
    }

    async fn append_pending(&self, device_id: &str, edits: &[RecordEdit]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .journals
            .entry(device_id.to_string())
            .or_default()
            .extend(edits.iter().cloned());
        Ok(())
    }

    async fn pending(&self, device_id: &str) -> Result<Vec<RecordEdit>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .journals
            .get(device_id)
            .map(|journal| journal.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_pending(&self, device_id: &str, count: usize) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(journal) = inner.journals.get_mut(device_id) else {
            return Ok(0);
        };
        let removed = count.min(journal.len());
        journal.drain(..removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edit(id: &str) -> RecordEdit {
        RecordEdit::new(id, "Jobs").with_field("name", json!(id), Timestamp::from_millis(1))
    }

    #[tokio::test]
    async fn test_watermark_never_regresses() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load_watermark("d").await.unwrap(), None);
        assert_eq!(
            store.save_watermark("d", Timestamp::from_millis(50)).await.unwrap(),
            Timestamp::from_millis(50)
        );
        assert_eq!(
            store.save_watermark("d", Timestamp::from_millis(20)).await.unwrap(),
            Timestamp::from_millis(50)
        );
        assert_eq!(
            store.load_watermark("d").await.unwrap(),
            Some(Timestamp::from_millis(50))
        );
    }

    #[tokio::test]
    async fn test_journal_is_fifo() {
        let store = MemoryStateStore::new();
        store.append_pending("d", &[edit("a"), edit("b")]).await.unwrap();
        store.append_pending("d", &[edit("c")]).await.unwrap();

        assert_eq!(store.remove_pending("d", 2).await.unwrap(), 2);
        let rest = store.pending("d").await.unwrap();
        assert_eq!(rest, vec![edit("c")]);
        assert_eq!(store.remove_pending("d", 5).await.unwrap(), 1);
        assert_eq!(store.remove_pending("other", 1).await.unwrap(), 0);
    }
}
