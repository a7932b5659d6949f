//! The outbound edit queue.
//!
//! Local edits are journaled, queued and drained through the dispatcher in
//! fixed-size batches. A batch leaves the queue (and the journal) only once
//! the runtime confirmed it; the first failure or refusal stops the loop
//! with everything undispatched left in place.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use fieldsync_bridge::Dispatch;
use fieldsync_core::{RecordEdit, Timestamp};
use fieldsync_store::StateStore;

use crate::config::OutboundConfig;
use crate::delivery::deliver;
use crate::error::Result;
use crate::indicator::ProcessingIndicator;
use crate::queue::{BatchPayload, DrainReport, QueueStats, SyncQueue};

struct OutboundInner<D, S> {
    dispatcher: Arc<D>,
    store: Arc<S>,
    device_id: String,
    config: OutboundConfig,
    queue: SyncQueue<RecordEdit>,
    indicator: ProcessingIndicator,
    /// Newest field timestamp the dispatcher has acknowledged.
    last_synced_out: Mutex<Option<Timestamp>>,
    /// Delivered edits still at the head of the journal.
    untrimmed: AtomicUsize,
    /// Keeps journal order equal to queue order across concurrent enqueues.
    enqueue_lock: tokio::sync::Mutex<()>,
}

/// Buffers local edits and pushes them out in bounded batches.
///
/// Cheap to clone; clones share the queue.
pub struct OutboundQueue<D: Dispatch, S: StateStore> {
    inner: Arc<OutboundInner<D, S>>,
}

impl<D: Dispatch, S: StateStore> Clone for OutboundQueue<D, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dispatch, S: StateStore> OutboundQueue<D, S> {
    pub fn new(
        dispatcher: Arc<D>,
        store: Arc<S>,
        device_id: impl Into<String>,
        config: OutboundConfig,
    ) -> Self {
        Self {
            inner: Arc::new(OutboundInner {
                dispatcher,
                store,
                device_id: device_id.into(),
                config,
                queue: SyncQueue::new(),
                indicator: ProcessingIndicator::new(),
                last_synced_out: Mutex::new(None),
                untrimmed: AtomicUsize::new(0),
                enqueue_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Accept edits for delivery.
    ///
    /// Waits only for the local journal, never for delivery. Returns the
    /// handle of the drain it started, or `None` if one was already running.
    pub async fn enqueue(&self, edits: Vec<RecordEdit>) -> Result<Option<JoinHandle<DrainReport>>> {
        for edit in &edits {
            edit.validate()?;
        }
        if edits.is_empty() {
            return Ok(None);
        }

        {
            let _ordered = self.inner.enqueue_lock.lock().await;
            self.inner
                .store
                .append_pending(&self.inner.device_id, &edits)
                .await?;
            let added = self.inner.queue.push(edits);
            tracing::debug!(added, queued = self.inner.queue.len(), "edits enqueued");
        }

        Ok(self.spawn_drain())
    }

    /// Re-queue edits journaled by a previous run. Returns how many.
    pub async fn restore(&self) -> Result<usize> {
        let _ordered = self.inner.enqueue_lock.lock().await;
        let journaled = self.inner.store.pending(&self.inner.device_id).await?;
        let restored = self.inner.queue.push(journaled);
        if restored > 0 {
            tracing::info!(restored, "restored unsent edits from journal");
        }
        Ok(restored)
    }

    /// Start a drain task unless one is running.
    pub fn spawn_drain(&self) -> Option<JoinHandle<DrainReport>> {
        if self.inner.queue.is_draining() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move { this.drain().await }))
    }

    /// Push queued edits out until the queue is empty or a batch fails.
    pub async fn drain(&self) -> DrainReport {
        let inner = &self.inner;
        if !inner.queue.try_begin_drain() {
            return DrainReport::skipped();
        }
        inner.indicator.set(true);

        let mut report = DrainReport::default();
        loop {
            while let Some((batch, remaining)) = inner.queue.next_batch(inner.config.batch_size) {
                let payload = BatchPayload {
                    updates: &batch,
                    remaining,
                };
                let sent = deliver(inner.dispatcher.as_ref(), &inner.config.script, &payload).await;
                if let Err(e) = sent {
                    tracing::warn!(
                        error = %e,
                        batch = batch.len(),
                        queued = inner.queue.len(),
                        "outbound batch failed, stopping drain"
                    );
                    report.error = Some(e.to_string());
                    break;
                }

                inner.queue.complete(batch.len());
                report.batches_sent += 1;
                report.items_sent += batch.len();

                if let Some(newest) = batch.iter().filter_map(RecordEdit::latest_timestamp).max() {
                    let mut marker = inner
                        .last_synced_out
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if marker.map_or(true, |m| newest > m) {
                        *marker = Some(newest);
                        report.advanced_to = Some(newest);
                    }
                }

                self.trim_journal(batch.len()).await;
            }

            report.remaining = inner.queue.len();
            inner.queue.reset_counters_if_complete();
            let failed = report.error.is_some();
            if inner
                .queue
                .release_drain(failed, || inner.indicator.set(false))
            {
                break;
            }
        }

        tracing::debug!(
            batches = report.batches_sent,
            items = report.items_sent,
            remaining = report.remaining,
            "outbound drain finished"
        );
        report
    }

    /// Drop `delivered` edits from the head of the journal, together with
    /// any left over by an earlier failed trim.
    ///
    /// While a trim keeps failing the journal still holds delivered edits and
    /// a restart sends them again: delivery is at-least-once.
    async fn trim_journal(&self, delivered: usize) {
        let inner = &self.inner;
        let count = delivered + inner.untrimmed.swap(0, Ordering::SeqCst);
        if let Err(e) = inner.store.remove_pending(&inner.device_id, count).await {
            inner.untrimmed.fetch_add(count, Ordering::SeqCst);
            tracing::warn!(error = %e, untrimmed = count, "failed to trim outbound journal");
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// Queued edits in delivery order.
    pub fn pending(&self) -> Vec<RecordEdit> {
        self.inner.queue.snapshot()
    }

    pub fn last_synced_out(&self) -> Option<Timestamp> {
        *self
            .inner
            .last_synced_out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn indicator(&self) -> &ProcessingIndicator {
        &self.inner.indicator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDispatcher;
    use fieldsync_store::MemoryStateStore;
    use serde_json::json;

    fn edit(id: &str, ts: i64) -> RecordEdit {
        RecordEdit::new(id, "Jobs").with_field("name", json!(id), Timestamp::from_millis(ts))
    }

    fn queue(
        batch_size: usize,
    ) -> (
        OutboundQueue<ScriptedDispatcher, MemoryStateStore>,
        Arc<ScriptedDispatcher>,
        Arc<MemoryStateStore>,
    ) {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        let store = Arc::new(MemoryStateStore::new());
        let config = OutboundConfig {
            batch_size,
            ..OutboundConfig::default()
        };
        let queue = OutboundQueue::new(dispatcher.clone(), store.clone(), "dev", config);
        (queue, dispatcher, store)
    }

    #[tokio::test]
    async fn test_drains_in_fifo_batches() {
        let (queue, dispatcher, store) = queue(2);
        let handle = queue
            .enqueue(vec![edit("a", 1), edit("b", 5), edit("c", 3)])
            .await
            .unwrap()
            .unwrap();
        let report = handle.await.unwrap();

        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.items_sent, 3);
        assert_eq!(report.advanced_to, Some(Timestamp::from_millis(5)));
        assert_eq!(queue.last_synced_out(), Some(Timestamp::from_millis(5)));

        let calls = dispatcher.calls();
        assert_eq!(calls[0].1["remaining"], json!(1));
        assert_eq!(calls[1].1["remaining"], json!(0));
        let ids: Vec<_> = dispatcher
            .batches()
            .concat()
            .iter()
            .map(|u| u["recordId"].clone())
            .collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);

        assert!(store.pending("dev").await.unwrap().is_empty());
        assert_eq!(queue.stats(), QueueStats::default());
        assert!(!queue.indicator().is_processing());
    }

    #[tokio::test]
    async fn test_first_batch_failure_keeps_everything() {
        let (queue, dispatcher, store) = queue(2);
        dispatcher.fail_call(0);

        let edits = vec![edit("a", 1), edit("b", 2), edit("c", 3), edit("d", 4)];
        let report = queue
            .enqueue(edits.clone())
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        assert!(report.error.is_some());
        assert_eq!(report.batches_sent, 0);
        assert_eq!(dispatcher.calls().len(), 1);
        assert_eq!(queue.pending(), edits);
        assert_eq!(store.pending("dev").await.unwrap(), edits);
        assert_eq!(queue.last_synced_out(), None);
        assert!(!queue.indicator().is_processing());
        assert!(!queue.stats().draining);
    }

    #[tokio::test]
    async fn test_mid_drain_failure_keeps_tail() {
        let (queue, dispatcher, _store) = queue(2);
        dispatcher.fail_call(1);

        let report = queue
            .enqueue(vec![edit("a", 1), edit("b", 2), edit("c", 3), edit("d", 4)])
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        assert_eq!(report.batches_sent, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(queue.pending(), vec![edit("c", 3), edit("d", 4)]);
        let stats = queue.stats();
        assert_eq!((stats.total, stats.completed), (4, 2));

        // A later enqueue retries from the head.
        let report = queue
            .enqueue(vec![edit("e", 5)])
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(queue.pending().is_empty());
        let last = dispatcher.batches().last().cloned().unwrap();
        assert_eq!(last[0]["recordId"], json!("e"));
    }

    #[tokio::test]
    async fn test_one_drain_at_a_time() {
        let (dispatcher, gate) = ScriptedDispatcher::gated();
        let dispatcher = Arc::new(dispatcher);
        let store = Arc::new(MemoryStateStore::new());
        let queue = OutboundQueue::new(dispatcher.clone(), store, "dev", OutboundConfig::default());

        let first = queue.enqueue(vec![edit("a", 1)]).await.unwrap().unwrap();
        tokio::task::yield_now().await;
        while dispatcher.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(queue.indicator().is_processing());

        // The running drain picks up the new edit; no second drain starts.
        assert!(queue.enqueue(vec![edit("b", 2)]).await.unwrap().is_none());
        assert_eq!(queue.drain().await, DrainReport::skipped());

        gate.add_permits(2);
        let report = first.await.unwrap();
        assert_eq!(report.batches_sent, 2);
        assert_eq!(dispatcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_requeues_journal() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        let store = Arc::new(MemoryStateStore::new());
        store
            .append_pending("dev", &[edit("a", 1), edit("b", 2)])
            .await
            .unwrap();

        let queue = OutboundQueue::new(dispatcher.clone(), store.clone(), "dev", OutboundConfig::default());
        assert_eq!(queue.restore().await.unwrap(), 2);
        let report = queue.spawn_drain().unwrap().await.unwrap();
        assert_eq!(report.items_sent, 2);
        assert!(store.pending("dev").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_edit_is_rejected() {
        let (queue, dispatcher, _) = queue(2);
        assert!(queue.enqueue(vec![RecordEdit::new("", "Jobs")]).await.is_err());
        assert!(queue.pending().is_empty());
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refused_batch_stays_queued_and_journaled() {
        let (queue, dispatcher, store) = queue(2);
        dispatcher.refuse_call(0);

        let edits = vec![edit("a", 1), edit("b", 2), edit("c", 3)];
        let report = queue
            .enqueue(edits.clone())
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        assert!(report.error.unwrap().contains("refused by test"));
        assert_eq!(report.batches_sent, 0);
        assert_eq!(dispatcher.calls().len(), 1);
        assert_eq!(queue.pending(), edits);
        assert_eq!(store.pending("dev").await.unwrap(), edits);
        assert_eq!(queue.last_synced_out(), None);
        assert!(!queue.stats().draining);
    }

    /// Journal whose trims fail while `broken` is set.
    #[derive(Default)]
    struct BrittleJournal {
        inner: MemoryStateStore,
        broken: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl StateStore for BrittleJournal {
        async fn load_watermark(&self, device_id: &str) -> fieldsync_store::Result<Option<Timestamp>> {
            self.inner.load_watermark(device_id).await
        }

        async fn save_watermark(&self, device_id: &str, at: Timestamp) -> fieldsync_store::Result<Timestamp> {
            self.inner.save_watermark(device_id, at).await
        }

        async fn append_pending(&self, device_id: &str, edits: &[RecordEdit]) -> fieldsync_store::Result<()> {
            self.inner.append_pending(device_id, edits).await
        }

        async fn pending(&self, device_id: &str) -> fieldsync_store::Result<Vec<RecordEdit>> {
            self.inner.pending(device_id).await
        }

        async fn remove_pending(&self, device_id: &str, count: usize) -> fieldsync_store::Result<usize> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(fieldsync_store::StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.remove_pending(device_id, count).await
        }
    }

    #[tokio::test]
    async fn test_failed_trim_is_caught_up_later() {
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        let store = Arc::new(BrittleJournal::default());
        let queue = OutboundQueue::new(dispatcher.clone(), store.clone(), "dev", OutboundConfig::default());

        store.broken.store(true, Ordering::SeqCst);
        let report = queue
            .enqueue(vec![edit("a", 1), edit("b", 2)])
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(queue.pending().is_empty());
        // Delivered but still journaled.
        assert_eq!(store.pending("dev").await.unwrap().len(), 2);

        store.broken.store(false, Ordering::SeqCst);
        queue
            .enqueue(vec![edit("c", 3)])
            .await
            .unwrap()
            .unwrap()
            .await
            .unwrap();
        assert!(store.pending("dev").await.unwrap().is_empty());
        assert_eq!(dispatcher.batches().concat().len(), 3);
    }
}
