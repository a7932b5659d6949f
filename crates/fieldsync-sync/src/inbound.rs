//! Inbound reconciliation.
//!
//! Consumes the cloud change stream, keeps only the fields that are new
//! relative to the device watermark, delivers them to the local store in
//! batches and moves the watermark once batch groups complete.
//!
//! ```text
//! cloud stream -> filter/shape -> inbound queue -> dispatcher (local store)
//!                                                      | ack
//!                         watermark <- gate <- tracker <-+
//!                            |
//!                            +-> device record, state store, resubscribe
//! ```
//!
//! Each subscription has a generation. Opening a new subscription bumps it,
//! which tells the pump task of the previous one to stop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use fieldsync_bridge::Dispatch;
use fieldsync_cloud::{
    ChangeKind, ChangeNotification, CloudStore, DeviceRecord, DocPath, Subscription, UpdatesQuery,
    WriteOptions,
};
use fieldsync_core::{
    reconcile_document, BatchTracker, CloudDocument, MinimalUpdate, Timestamp, Watermark,
    WatermarkGate,
};
use fieldsync_store::StateStore;

use crate::config::{DeviceScope, InboundConfig};
use crate::delivery::deliver;
use crate::error::Result;
use crate::indicator::ProcessingIndicator;
use crate::queue::{BatchPayload, DrainReport, QueueStats, SyncQueue};

/// Batch-group progress and the watermark, guarded together.
struct Progress {
    tracker: BatchTracker,
    gate: WatermarkGate,
}

struct InboundInner<D, C, S> {
    dispatcher: Arc<D>,
    cloud: Arc<C>,
    store: Arc<S>,
    scope: DeviceScope,
    config: InboundConfig,
    queue: SyncQueue<MinimalUpdate>,
    progress: Mutex<Progress>,
    active_query: Mutex<Option<UpdatesQuery>>,
    generation: watch::Sender<u64>,
    indicator: ProcessingIndicator,
}

/// Reconciles cloud updates into the local store.
///
/// Cheap to clone; clones share all state.
pub struct InboundProcessor<D: Dispatch, C: CloudStore, S: StateStore> {
    inner: Arc<InboundInner<D, C, S>>,
}

impl<D: Dispatch, C: CloudStore, S: StateStore> Clone for InboundProcessor<D, C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dispatch, C: CloudStore, S: StateStore> InboundProcessor<D, C, S> {
    pub fn new(
        dispatcher: Arc<D>,
        cloud: Arc<C>,
        store: Arc<S>,
        scope: DeviceScope,
        config: InboundConfig,
        watermark: Timestamp,
    ) -> Self {
        let tracker = BatchTracker::new().with_staleness(config.group_staleness);
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(InboundInner {
                dispatcher,
                cloud,
                store,
                scope,
                config,
                queue: SyncQueue::new(),
                progress: Mutex::new(Progress {
                    tracker,
                    gate: WatermarkGate::new(Watermark::new(watermark)),
                }),
                active_query: Mutex::new(None),
                generation,
                indicator: ProcessingIndicator::new(),
            }),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> MutexGuard<'_, Option<UpdatesQuery>> {
        self.inner
            .active_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn watermark(&self) -> Timestamp {
        self.progress().gate.get()
    }

    /// Move the watermark forward to a restored value. Never regresses.
    pub fn restore_watermark(&self, at: Timestamp) -> bool {
        self.progress().gate.restore(at)
    }

    /// The query a subscription opened now would use.
    pub fn query(&self) -> UpdatesQuery {
        UpdatesQuery::new(
            DocPath::updates_collection(&self.inner.scope.organization_id),
            self.inner.scope.contexts.iter().cloned(),
            self.watermark(),
        )
    }

    /// The query of the live subscription, if any.
    pub fn active_query(&self) -> Option<UpdatesQuery> {
        self.active().clone()
    }

    /// Tear down the current subscription and open one from the watermark.
    ///
    /// A failure is returned as-is; nothing retries on its own.
    pub async fn subscribe(&self) -> Result<UpdatesQuery> {
        let (subscription, generation) = self.open().await?;
        let query = subscription.query().clone();
        let this = self.clone();
        tokio::spawn(async move { this.pump(subscription, generation).await });
        Ok(query)
    }

    /// Stop the live subscription.
    pub fn unsubscribe(&self) {
        self.next_generation();
        *self.active() = None;
    }

    fn next_generation(&self) -> u64 {
        let mut generation = 0;
        self.inner.generation.send_modify(|g| {
            *g += 1;
            generation = *g;
        });
        generation
    }

    async fn open(&self) -> Result<(Subscription, u64)> {
        let generation = self.next_generation();
        *self.active() = None;

        let query = self.query();
        let subscription = match self.inner.cloud.subscribe(query.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(error = %e, "subscribe failed");
                return Err(e.into());
            }
        };

        // A newer subscribe may have started while this one was opening.
        if *self.inner.generation.borrow() == generation {
            *self.active() = Some(query.clone());
        }
        tracing::info!(
            after = %query.after,
            contexts = query.contexts.len(),
            "subscribed to cloud updates"
        );
        Ok((subscription, generation))
    }

    /// Feed notification cycles into reconciliation until superseded.
    async fn pump(self, mut subscription: Subscription, mut generation: u64) {
        let mut generations = self.inner.generation.subscribe();
        loop {
            let current = *generations.borrow_and_update();
            if current != generation {
                tracing::debug!(generation, "subscription superseded");
                return;
            }

            let cycle = tokio::select! {
                changed = generations.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
                cycle = subscription.next() => cycle,
            };

            let changes = match cycle {
                Some(Ok(changes)) => changes,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "update stream failed; waiting for resubscribe");
                    self.clear_active(generation);
                    return;
                }
                None => {
                    tracing::debug!("update stream closed");
                    self.clear_active(generation);
                    return;
                }
            };

            let report = self.process(changes).await;
            let current = *self.inner.generation.borrow();
            if report.advanced_to.is_some() && current == generation {
                match self.open().await {
                    Ok((next, next_generation)) => {
                        subscription = next;
                        generation = next_generation;
                    }
                    Err(_) => return,
                }
            }
        }
    }

    fn clear_active(&self, generation: u64) {
        if *self.inner.generation.borrow() == generation {
            *self.active() = None;
        }
    }

    /// Filter and shape one notification cycle into the queue.
    ///
    /// Removals and documents with nothing past the watermark are dropped.
    /// Returns how many updates were queued.
    pub fn ingest(&self, changes: Vec<ChangeNotification>) -> usize {
        let watermark = self.watermark();
        let mut updates = Vec::new();

        for change in changes {
            if change.kind == ChangeKind::Removed {
                continue;
            }
            match CloudDocument::from_document(&change.doc_id, &change.document) {
                Ok(document) => match reconcile_document(&document, watermark) {
                    Some(update) => updates.push(update.with_source(change.doc_id.clone())),
                    None => tracing::trace!(doc_id = %change.doc_id, "nothing new in document"),
                },
                Err(e) => {
                    tracing::warn!(doc_id = %change.doc_id, error = %e, "skipping cloud document")
                }
            }
        }

        let queued = self.inner.queue.push(updates);
        if queued > 0 {
            self.inner.indicator.set(true);
            tracing::debug!(queued, %watermark, "inbound updates queued");
        }
        queued
    }

    /// Ingest a cycle and deliver it.
    pub async fn process(&self, changes: Vec<ChangeNotification>) -> DrainReport {
        if self.ingest(changes) == 0 && self.inner.queue.is_empty() {
            return DrainReport::default();
        }
        self.drain().await
    }

    /// Deliver queued updates until the queue is empty or a batch fails.
    ///
    /// The watermark is persisted before the drain lets go of the queue, so
    /// successive drains write it in increasing order.
    pub async fn drain(&self) -> DrainReport {
        let inner = &self.inner;
        if !inner.queue.try_begin_drain() {
            return DrainReport::skipped();
        }
        inner.indicator.set(true);

        let mut persisted = self.watermark();
        let mut report = DrainReport::default();
        loop {
            while let Some((batch, remaining)) = inner.queue.next_batch(inner.config.batch_size) {
                let payload = BatchPayload {
                    updates: &batch,
                    remaining,
                };
                let delivered =
                    deliver(inner.dispatcher.as_ref(), &inner.config.script, &payload).await;
                if let Err(e) = delivered {
                    tracing::warn!(
                        error = %e,
                        batch = batch.len(),
                        queued = inner.queue.len(),
                        "inbound batch failed, stopping delivery"
                    );
                    report.error = Some(e.to_string());
                    break;
                }

                inner.queue.complete(batch.len());
                report.batches_sent += 1;
                report.items_sent += batch.len();
                self.observe_delivered(&batch);
            }

            let current = self.watermark();
            if current > persisted {
                self.persist_watermark(current).await;
                persisted = current;
                report.advanced_to = Some(current);
            }

            if inner.queue.reset_counters_if_complete() {
                tracing::trace!("inbound counters reset");
            }
            report.remaining = inner.queue.len();
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
            watermark = %persisted,
            "inbound drain finished"
        );
        report
    }

    fn observe_delivered(&self, batch: &[MinimalUpdate]) {
        let now = Timestamp::now();
        let mut progress = self.progress();
        let Progress { tracker, gate } = &mut *progress;

        for update in batch {
            if let Some(candidate) = tracker.observe_update(update, now).candidate() {
                gate.offer(candidate);
            }
        }
        for (_, candidate) in tracker.expire_stale(now) {
            gate.offer(candidate);
        }
        if gate.release(tracker.floor()) {
            tracing::debug!(watermark = %gate.get(), "watermark advanced");
        }
    }

    /// Write the watermark to the device record and the local store.
    /// Both are best effort.
    async fn persist_watermark(&self, at: Timestamp) {
        let scope = &self.inner.scope;
        let patch = DeviceRecord::watermark_patch(&scope.organization_id, &scope.device_id, at);
        let path = DocPath::device(&scope.organization_id, &scope.device_id);

        if let Err(e) = self
            .inner
            .cloud
            .write(&path, patch, WriteOptions::merge())
            .await
        {
            tracing::warn!(error = %e, watermark = %at, "failed to persist watermark to cloud");
        }
        if let Err(e) = self.inner.store.save_watermark(&scope.device_id, at).await {
            tracing::warn!(error = %e, watermark = %at, "failed to persist watermark locally");
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// Updates waiting for delivery, in order.
    pub fn pending(&self) -> Vec<MinimalUpdate> {
        self.inner.queue.snapshot()
    }

    /// Batch groups still waiting for members.
    pub fn open_groups(&self) -> usize {
        self.progress().tracker.pending_groups()
    }

    pub fn indicator(&self) -> &ProcessingIndicator {
        &self.inner.indicator
    }

    pub fn scope(&self) -> &DeviceScope {
        &self.inner.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDispatcher;
    use fieldsync_cloud::MemoryCloudStore;
    use fieldsync_core::Document;
    use fieldsync_store::MemoryStateStore;
    use serde_json::{json, Value};
    use std::time::Duration;

    type Processor = InboundProcessor<ScriptedDispatcher, MemoryCloudStore, MemoryStateStore>;

    struct Harness {
        processor: Processor,
        dispatcher: Arc<ScriptedDispatcher>,
        cloud: Arc<MemoryCloudStore>,
        store: Arc<MemoryStateStore>,
    }

    fn harness(batch_size: usize, watermark: i64) -> Harness {
        harness_with(ScriptedDispatcher::new(), batch_size, watermark)
    }

    fn harness_with(dispatcher: ScriptedDispatcher, batch_size: usize, watermark: i64) -> Harness {
        let dispatcher = Arc::new(dispatcher);
        let cloud = Arc::new(MemoryCloudStore::new());
        let store = Arc::new(MemoryStateStore::new());
        let config = InboundConfig {
            batch_size,
            ..InboundConfig::default()
        };
        let processor = InboundProcessor::new(
            dispatcher.clone(),
            cloud.clone(),
            store.clone(),
            DeviceScope::new("org", "dev", ["north"]),
            config,
            Timestamp::from_millis(watermark),
        );
        Harness {
            processor,
            dispatcher,
            cloud,
            store,
        }
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn update_doc(id: &str, modified: i64, stamps: &[(&str, i64)], group: Option<(&str, u32)>) -> Document {
        let mut fields = serde_json::Map::new();
        let mut per_field = serde_json::Map::new();
        for (name, ts) in stamps {
            fields.insert(name.to_string(), json!(format!("{name}@{ts}")));
            per_field.insert(name.to_string(), json!(ts));
        }
        let mut document = doc(json!({
            "id": id,
            "table": "Jobs",
            "modifiedAt": modified,
            "contexts": ["north"],
            "perFieldTimestamp": per_field,
        }));
        if let Some((group_id, size)) = group {
            document.insert("batchGroupId".into(), json!(group_id));
            document.insert("batchGroupSize".into(), json!(size));
        }
        document.extend(fields);
        document
    }

    fn added(id: &str, document: Document) -> ChangeNotification {
        ChangeNotification {
            kind: ChangeKind::Added,
            doc_id: id.to_string(),
            document,
        }
    }

    #[tokio::test]
    async fn test_only_new_fields_are_delivered() {
        let h = harness(25, 60);
        let report = h
            .processor
            .process(vec![added("R1", update_doc("R1", 100, &[("name", 100), ("qty", 50)], None))])
            .await;

        assert_eq!(report.items_sent, 1);
        let batches = h.dispatcher.batches();
        let update = &batches[0][0];
        assert_eq!(update["name"], json!("name@100"));
        assert!(update.get("qty").is_none());
        assert_eq!(update["perFieldTimestamp"], json!({"name": 100}));
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(100));
    }

    #[tokio::test]
    async fn test_stale_documents_and_removals_are_dropped() {
        let h = harness(25, 60);
        let removed = ChangeNotification {
            kind: ChangeKind::Removed,
            doc_id: "R2".into(),
            document: update_doc("R2", 500, &[("name", 500)], None),
        };
        let queued = h.processor.ingest(vec![
            added("R1", update_doc("R1", 90, &[("name", 40), ("qty", 60)], None)),
            removed,
            added("bad", doc(json!({"modifiedAt": 1}))),
        ]);
        assert_eq!(queued, 0);
        assert!(h.processor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_group_advances_only_when_complete() {
        let h = harness(1, 0);
        let g = Some(("g1", 3));

        h.processor
            .process(vec![
                added("a", update_doc("a", 10, &[("f", 10)], g)),
                added("b", update_doc("b", 20, &[("f", 20)], g)),
            ])
            .await;
        assert_eq!(h.processor.watermark(), Timestamp::ZERO);
        assert_eq!(h.processor.open_groups(), 1);

        let report = h
            .processor
            .process(vec![added("c", update_doc("c", 15, &[("f", 15)], g))])
            .await;
        assert_eq!(report.advanced_to, Some(Timestamp::from_millis(20)));
        assert_eq!(h.processor.open_groups(), 0);

        // Persisted both to the cloud device record and locally.
        let device = h.cloud.document(&DocPath::device("org", "dev")).unwrap();
        assert_eq!(device["watermarkTimestamp"], json!(20));
        assert_eq!(
            h.store.load_watermark("dev").await.unwrap(),
            Some(Timestamp::from_millis(20))
        );
    }

    #[tokio::test]
    async fn test_ungrouped_update_does_not_skip_open_group() {
        let h = harness(25, 0);
        h.processor
            .process(vec![
                added("a", update_doc("a", 10, &[("f", 10)], Some(("g1", 2)))),
                added("z", update_doc("z", 30, &[("f", 30)], None)),
            ])
            .await;
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(9));

        h.processor
            .process(vec![added("b", update_doc("b", 12, &[("f", 12)], Some(("g1", 2))))])
            .await;
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(30));
    }

    #[tokio::test]
    async fn test_failed_delivery_leaves_watermark() {
        let h = harness(1, 0);
        h.dispatcher.fail_call(1);

        let report = h
            .processor
            .process(vec![
                added("a", update_doc("a", 10, &[("f", 10)], None)),
                added("b", update_doc("b", 20, &[("f", 20)], None)),
            ])
            .await;

        assert!(report.error.is_some());
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(10));
        assert_eq!(h.processor.pending().len(), 1);
        assert!(!h.processor.indicator().is_processing());
    }

    #[tokio::test]
    async fn test_watermark_persistence_failure_is_not_fatal() {
        let h = harness(25, 0);
        h.cloud.set_fail_writes(true);
        let report = h
            .processor
            .process(vec![added("a", update_doc("a", 10, &[("f", 10)], None))])
            .await;
        assert!(report.is_success());
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(10));
        assert_eq!(
            h.store.load_watermark("dev").await.unwrap(),
            Some(Timestamp::from_millis(10))
        );
    }

    #[tokio::test]
    async fn test_counters_reset_after_full_delivery() {
        let h = harness(1, 0);
        h.processor
            .process(vec![
                added("a", update_doc("a", 10, &[("f", 10)], None)),
                added("b", update_doc("b", 11, &[("f", 11)], None)),
            ])
            .await;
        assert_eq!(h.processor.stats(), QueueStats::default());
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_subscription_resubscribes_after_advance() {
        let h = harness(25, 0);
        h.cloud.put(
            &DocPath::update("org", "a"),
            update_doc("a", 40, &[("f", 40)], None),
        );

        let first = h.processor.subscribe().await.unwrap();
        assert_eq!(first.after, Timestamp::ZERO);

        wait_for(|| h.cloud.queries().len() == 2).await;
        let queries = h.cloud.queries();
        assert_eq!(queries[1].after, Timestamp::from_millis(40));
        assert_eq!(h.processor.active_query(), Some(queries[1].clone()));
        wait_for(|| h.cloud.active_subscriptions() == 1).await;

        // A later write flows through the new subscription.
        h.cloud.put(
            &DocPath::update("org", "b"),
            update_doc("b", 55, &[("f", 55)], None),
        );
        wait_for(|| h.processor.watermark() == Timestamp::from_millis(55)).await;
    }

    #[tokio::test]
    async fn test_resubscribe_with_same_watermark_is_idempotent() {
        let h = harness(25, 70);
        let a = h.processor.subscribe().await.unwrap();
        let b = h.processor.subscribe().await.unwrap();
        assert_eq!(a, b);
        wait_for(|| h.cloud.active_subscriptions() == 1).await;
    }

    #[tokio::test]
    async fn test_stream_error_stops_until_resubscribe() {
        let h = harness(25, 0);
        h.processor.subscribe().await.unwrap();
        h.cloud.inject_stream_error("permission denied");
        wait_for(|| h.processor.active_query().is_none()).await;

        h.cloud.put(
            &DocPath::update("org", "a"),
            update_doc("a", 40, &[("f", 40)], None),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.processor.watermark(), Timestamp::ZERO);
        assert_eq!(h.cloud.queries().len(), 1);

        h.processor.subscribe().await.unwrap();
        wait_for(|| h.processor.watermark() == Timestamp::from_millis(40)).await;
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_returned() {
        let h = harness(25, 0);
        h.cloud.set_fail_subscribe(true);
        assert!(h.processor.subscribe().await.is_err());
        assert!(h.processor.active_query().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_pump() {
        let h = harness(25, 0);
        h.processor.subscribe().await.unwrap();
        h.processor.unsubscribe();
        wait_for(|| h.cloud.active_subscriptions() == 0).await;
        assert!(h.processor.active_query().is_none());
    }

    #[tokio::test]
    async fn test_restore_never_regresses() {
        let h = harness(25, 100);
        assert!(!h.processor.restore_watermark(Timestamp::from_millis(50)));
        assert!(h.processor.restore_watermark(Timestamp::from_millis(150)));
        assert_eq!(h.processor.query().after, Timestamp::from_millis(150));
    }

    fn stored_remote_watermark(h: &Harness) -> Option<Timestamp> {
        h.cloud
            .document(&DocPath::device("org", "dev"))
            .and_then(|device| DeviceRecord::watermark_of(&device))
    }

    #[tokio::test]
    async fn test_refused_batch_leaves_watermark() {
        let h = harness(25, 0);
        h.dispatcher.refuse_call(0);

        let report = h
            .processor
            .process(vec![added("U1", update_doc("R1", 100, &[("name", 100)], None))])
            .await;

        assert!(report.error.unwrap().contains("refused by test"));
        assert_eq!(report.advanced_to, None);
        assert_eq!(h.processor.watermark(), Timestamp::ZERO);
        assert_eq!(h.processor.pending().len(), 1);
        assert_eq!(stored_remote_watermark(&h), None);
        assert!(!h.processor.indicator().is_processing());

        // The next cycle retries the retained update.
        let report = h.processor.process(Vec::new()).await;
        assert!(report.is_success());
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(100));
        assert!(h.processor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_group_counts_documents_not_records() {
        let h = harness(25, 0);
        let report = h
            .processor
            .process(vec![
                added("d1", update_doc("R1", 10, &[("name", 10)], Some(("g1", 2)))),
                added("d2", update_doc("R1", 20, &[("qty", 20)], Some(("g1", 2)))),
            ])
            .await;

        assert_eq!(report.items_sent, 2);
        assert_eq!(h.processor.open_groups(), 0);
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(20));
    }

    #[tokio::test]
    async fn test_redelivered_document_is_one_member() {
        let h = harness(25, 0);
        let member = || added("d1", update_doc("R1", 10, &[("name", 10)], Some(("g1", 2))));
        h.processor.process(vec![member()]).await;
        h.processor.process(vec![member()]).await;

        assert_eq!(h.processor.open_groups(), 1);
        assert_eq!(h.processor.watermark(), Timestamp::ZERO);
    }

    #[tokio::test]
    async fn test_drain_started_mid_delivery_is_folded_in() {
        let (dispatcher, gate) = ScriptedDispatcher::gated();
        let h = harness_with(dispatcher, 1, 0);

        h.processor
            .ingest(vec![added("U1", update_doc("R1", 100, &[("name", 100)], None))]);
        let first = {
            let processor = h.processor.clone();
            tokio::spawn(async move { processor.drain().await })
        };
        while h.dispatcher.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        h.processor
            .ingest(vec![added("U2", update_doc("R2", 200, &[("name", 200)], None))]);
        assert_eq!(h.processor.drain().await, DrainReport::skipped());

        gate.add_permits(2);
        let report = first.await.unwrap();
        assert_eq!(report.items_sent, 2);
        assert_eq!(report.advanced_to, Some(Timestamp::from_millis(200)));
        assert_eq!(h.processor.watermark(), Timestamp::from_millis(200));
        assert_eq!(stored_remote_watermark(&h), Some(Timestamp::from_millis(200)));
        assert_eq!(
            h.store.load_watermark("dev").await.unwrap(),
            Some(Timestamp::from_millis(200))
        );
        assert!(!h.processor.stats().draining);
        assert!(!h.processor.indicator().is_processing());
    }
}
