//! The Engine: the sync engine as the host sees it.
//!
//! Wires the bridge, both pipelines, the cloud store and the local state
//! store together, runs startup, and answers the named actions the local
//! runtime sends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use fieldsync_bridge::{Bridge, Settlement};
use fieldsync_cloud::{
    ChangeKind, ChangeNotification, CloudStore, DeviceRecord, DocPath, WriteOptions,
};
use fieldsync_core::{Document, RecordEdit, Timestamp};
use fieldsync_store::StateStore;
use fieldsync_sync::{DrainReport, InboundProcessor, OutboundQueue, ProcessingIndicator};

use crate::action::{ActionRequest, ActionResult, NamedAction};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::status::{EditsState, StatusBoard};

/// Length of generated edit document ids.
const EDIT_ID_LEN: usize = 20;

/// Table written for edits that name none.
const UNKNOWN_TABLE: &str = "UnknownTable";

/// What `start` found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// The watermark inbound sync resumes from.
    pub watermark: Timestamp,
    /// Unsent edits re-queued from the journal.
    pub restored_edits: usize,
    /// False for passive devices and failed subscribes.
    pub subscribed: bool,
}

/// Outcome of writing received edits to the cloud.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EditsWritten {
    written: usize,
    failed: usize,
    containers_uploaded: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InboundOptions {
    /// Raw cloud documents to reconcile before delivering.
    documents: Vec<Document>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatusOptions {
    current_state: Option<Value>,
    pending_edits: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DownloadOptions {
    updates: DownloadCounts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DownloadCounts {
    total_containers: Option<u64>,
    completed_containers: Option<u64>,
}

/// The sync engine.
///
/// Provides:
/// - Startup (parent documents, watermark and journal restore, subscribe)
/// - Local edit intake through the outbound queue
/// - Named actions for the local runtime
pub struct Engine<C: CloudStore, S: StateStore> {
    config: EngineConfig,
    bridge: Bridge,
    cloud: Arc<C>,
    store: Arc<S>,
    outbound: OutboundQueue<Bridge, S>,
    inbound: InboundProcessor<Bridge, C, S>,
    status: Mutex<StatusBoard>,
    /// Set and cleared by the runtime through named actions.
    processing: ProcessingIndicator,
    ready: AtomicBool,
}

impl<C: CloudStore, S: StateStore> Engine<C, S> {
    /// Create an engine. Nothing happens until [`Engine::start`].
    pub fn new(config: EngineConfig, bridge: Bridge, cloud: C, store: S) -> Self {
        let dispatcher = Arc::new(bridge.clone());
        let cloud = Arc::new(cloud);
        let store = Arc::new(store);

        let outbound = OutboundQueue::new(
            dispatcher.clone(),
            store.clone(),
            config.device.device_id.clone(),
            config.outbound.clone(),
        );
        let inbound = InboundProcessor::new(
            dispatcher,
            cloud.clone(),
            store.clone(),
            config.device.scope(),
            config.inbound.clone(),
            Timestamp::ZERO,
        );

        Self {
            config,
            bridge,
            cloud,
            store,
            outbound,
            inbound,
            status: Mutex::new(StatusBoard::new()),
            processing: ProcessingIndicator::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn outbound(&self) -> &OutboundQueue<Bridge, S> {
        &self.outbound
    }

    pub fn inbound(&self) -> &InboundProcessor<Bridge, C, S> {
        &self.inbound
    }

    pub fn watermark(&self) -> Timestamp {
        self.inbound.watermark()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// True while the runtime flagged processing or either pipeline drains.
    pub fn is_processing(&self) -> bool {
        self.processing.is_processing()
            || self.outbound.indicator().is_processing()
            || self.inbound.indicator().is_processing()
    }

    pub fn status(&self) -> StatusBoard {
        self.status_board().clone()
    }

    fn status_board(&self) -> MutexGuard<'_, StatusBoard> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring the engine up.
    ///
    /// Parent document and subscribe failures are logged and tolerated;
    /// local state store failures are returned.
    pub async fn start(&self) -> Result<StartReport> {
        let device = &self.config.device;
        tracing::info!(
            organization = %device.organization_id,
            device = %device.device_id,
            mode = ?device.mode,
            "starting sync engine"
        );

        self.ensure_parent_documents().await;
        let watermark = self.resume_watermark().await?;

        let restored_edits = self.outbound.restore().await?;
        if restored_edits > 0 {
            self.outbound.spawn_drain();
        }

        self.ready.store(true, Ordering::Release);

        let subscribed = if device.is_passive() {
            tracing::info!("device is passive, not subscribing to updates");
            false
        } else {
            match self.inbound.subscribe().await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "initial subscribe failed");
                    false
                }
            }
        };

        Ok(StartReport {
            watermark,
            restored_edits,
            subscribed,
        })
    }

    /// Stop the update subscription. Queued work is kept.
    pub fn stop(&self) {
        self.inbound.unsubscribe();
        self.ready.store(false, Ordering::Release);
        tracing::info!("sync engine stopped");
    }

    async fn ensure_parent_documents(&self) {
        let device = &self.config.device;

        let organization = DocPath::organization(&device.organization_id);
        if let Err(e) = self
            .cloud
            .write(&organization, Document::new(), WriteOptions::merge())
            .await
        {
            tracing::warn!(path = %organization, error = %e, "failed to ensure organization document");
        }

        let mut fields = Document::new();
        fields.insert("deviceType".into(), Value::from(device.device_type.clone()));
        let path = DocPath::device(&device.organization_id, &device.device_id);
        if let Err(e) = self.cloud.write(&path, fields, WriteOptions::merge()).await {
            tracing::warn!(path = %path, error = %e, "failed to ensure device document");
        }
    }

    /// Resume from the newer of the local and the cloud watermark, or from
    /// now if neither exists, and write the result back to both.
    async fn resume_watermark(&self) -> Result<Timestamp> {
        let device = &self.config.device;
        let path = DocPath::device(&device.organization_id, &device.device_id);

        let local = self.store.load_watermark(&device.device_id).await?;
        let remote = match self.cloud.read(&path).await {
            Ok(document) => document.as_ref().and_then(DeviceRecord::watermark_of),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read device record");
                None
            }
        };
        let resumed = local.max(remote).unwrap_or_else(Timestamp::now);

        if local != Some(resumed) {
            self.store.save_watermark(&device.device_id, resumed).await?;
        }
        if remote != Some(resumed) {
            let patch = DeviceRecord::watermark_patch(
                &device.organization_id,
                &device.device_id,
                resumed,
            );
            if let Err(e) = self.cloud.write(&path, patch, WriteOptions::merge()).await {
                tracing::warn!(error = %e, "failed to write resumed watermark to device record");
            }
        }

        self.inbound.restore_watermark(resumed);
        tracing::info!(watermark = %resumed, ?local, ?remote, "watermark resumed");
        Ok(resumed)
    }

    /// Wait for `start` to finish, bounded by the configured attempts.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let attempts = self.config.ready_attempts;
        let mut attempt = 0;
        while !self.is_ready() {
            attempt += 1;
            if attempt > attempts {
                return Err(EngineError::NotReady { attempts });
            }
            tracing::debug!(attempt, attempts, "engine not ready yet");
            tokio::time::sleep(self.config.ready_retry_delay).await;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand locally originated edits to the outbound queue.
    ///
    /// Returns once the edits are journaled, with the drain it started.
    pub async fn receive_local_edits(
        &self,
        edits: Vec<RecordEdit>,
    ) -> Result<Option<JoinHandle<DrainReport>>> {
        let count = edits.len();
        let drain = self.outbound.enqueue(edits).await?;
        tracing::debug!(count, "local edits received");
        Ok(drain)
    }

    /// Entry point for the runtime's replies.
    pub fn callback(&self, payload: &str) -> Settlement {
        self.bridge.callback(payload)
    }

    /// Run a named action. Failures are reported in the result.
    pub async fn named_action(&self, name: &str, options: Value) -> ActionResult {
        let action = match name.parse::<NamedAction>() {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(name, "unknown named action");
                return e.into();
            }
        };
        tracing::debug!(%action, "running named action");

        let outcome = match action {
            NamedAction::SubscribeUpdates => self.subscribe_updates().await,
            NamedAction::InboundUpdates => self.inbound_updates(options).await,
            NamedAction::EditsUpdateStatus => self.edits_update_status(options).await,
            NamedAction::UpdatesContainerDownloads => self.updates_container_downloads(options),
            NamedAction::WebSyncReceivePayload => self.receive_payload(options).await,
            NamedAction::IsProcessing => {
                self.processing.set(true);
                Ok(ActionResult::ok())
            }
            NamedAction::EndProcessing => {
                self.processing.set(false);
                Ok(ActionResult::ok())
            }
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(%action, error = %e, "named action failed");
            e.into()
        })
    }

    /// Run a `{name, options}` request given as JSON text; answers JSON text.
    pub async fn named_action_json(&self, request: &str) -> String {
        let result = match serde_json::from_str::<ActionRequest>(request) {
            Ok(request) => self.named_action(&request.name, request.options).await,
            Err(e) => {
                tracing::warn!(error = %e, "malformed action request");
                ActionResult::failure(format!("invalid action request: {e}"))
            }
        };
        serde_json::to_string(&result)
            .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}).to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────────

    fn passive() -> ActionResult {
        ActionResult::ok().with_message("Device is passive, inbound sync is disabled")
    }

    async fn subscribe_updates(&self) -> Result<ActionResult> {
        if self.config.device.is_passive() {
            return Ok(Self::passive());
        }
        let query = self.inbound.subscribe().await?;
        Ok(ActionResult::ok()
            .with_message("Subscribed to updates")
            .with_data(json!({"after": query.after, "contexts": query.contexts})))
    }

    async fn inbound_updates(&self, options: Value) -> Result<ActionResult> {
        if self.config.device.is_passive() {
            return Ok(Self::passive());
        }
        let options: InboundOptions = decode_options(NamedAction::InboundUpdates, options)?;

        let changes = options
            .documents
            .into_iter()
            .map(|document| ChangeNotification {
                kind: ChangeKind::Modified,
                doc_id: document
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                document,
            })
            .collect();
        let queued = self.inbound.ingest(changes);
        let report = self.inbound.drain().await;

        // The pump resubscribes on its own cycles only.
        if report.advanced_to.is_some() && self.inbound.active_query().is_some() {
            if let Err(e) = self.inbound.subscribe().await {
                tracing::warn!(error = %e, "resubscribe after inbound delivery failed");
            }
        }

        let data = json!({
            "queued": queued,
            "delivered": report.items_sent,
            "remaining": report.remaining,
            "watermark": self.inbound.watermark(),
        });
        Ok(match report.error {
            Some(error) => ActionResult::failure(error).with_data(data),
            None if report.skipped => ActionResult::ok()
                .with_message("Inbound delivery already running")
                .with_data(data),
            None => ActionResult::ok()
                .with_message(format!("Delivered {} updates", report.items_sent))
                .with_data(data),
        })
    }

    async fn edits_update_status(&self, options: Value) -> Result<ActionResult> {
        let options: StatusOptions = decode_options(NamedAction::EditsUpdateStatus, options)?;
        let snapshot = {
            let mut status = self.status_board();
            if let Some(raw) = &options.current_state {
                match EditsState::from_value(raw) {
                    Some(state) => {
                        status.set_edits_state(state);
                    }
                    None => tracing::warn!(state = %raw, "ignoring unknown edits state"),
                }
            }
            if let Some(pending) = options.pending_edits {
                status.set_pending_edits(pending);
            }
            status.clone()
        };

        self.bridge.return_result(&json!({"status": "ok"})).await?;
        Ok(ActionResult::ok()
            .with_message(snapshot.edits_state.label())
            .with_data(serde_json::to_value(&snapshot)?))
    }

    fn updates_container_downloads(&self, options: Value) -> Result<ActionResult> {
        let options: DownloadOptions =
            decode_options(NamedAction::UpdatesContainerDownloads, options)?;
        let counts = options.updates;

        let (reset, downloads) = {
            let mut status = self.status_board();
            let reset = status.downloads.record(
                counts.total_containers.unwrap_or(0),
                counts.completed_containers.unwrap_or(0),
            );
            (reset, status.downloads)
        };
        if reset {
            tracing::debug!("container downloads complete");
        }
        self.bridge.post(json!({"status": "ok"}));
        Ok(ActionResult::ok().with_data(json!({"downloads": downloads, "reset": reset})))
    }

    async fn receive_payload(&self, options: Value) -> Result<ActionResult> {
        let Some(payload) = options.get("payload").filter(|p| !p.is_null()) else {
            return Ok(ActionResult::failure("No payload provided"));
        };

        if payload.get("status").is_some_and(|s| !s.is_null()) {
            tracing::debug!(status = %payload["status"], "status ping from runtime");
            self.bridge.post(json!({"status": "ok"}));
            return Ok(ActionResult::ok().with_message("Status acknowledged"));
        }

        let edits = match payload.get("edits").and_then(Value::as_array) {
            Some(edits) if !edits.is_empty() => edits,
            _ => return Ok(ActionResult::failure("No edits to process")),
        };

        self.wait_until_ready().await?;
        let outcome = self.write_edits(edits).await;

        {
            let mut status = self.status_board();
            status.set_edits_state(EditsState::UpdatesSent);
            let announced = payload
                .get("totalContainers")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if status.uploads.record(announced, outcome.containers_uploaded) {
                tracing::debug!("container uploads complete");
            }
        }
        self.processing.set(false);

        let mut ack = Map::new();
        if let Some(end) = payload.get("modificationTimestampUTCEnd") {
            ack.insert("modificationTimestampUTCEnd".into(), end.clone());
        }
        self.bridge.post(json!({"payload": ack}));

        tracing::info!(
            written = outcome.written,
            failed = outcome.failed,
            containers = outcome.containers_uploaded,
            "received edits written to cloud"
        );
        Ok(ActionResult::ok()
            .with_message(format!("Wrote {} of {} edits", outcome.written, edits.len()))
            .with_data(json!({
                "written": outcome.written,
                "failed": outcome.failed,
                "containersUploaded": outcome.containers_uploaded,
            })))
    }

    /// Write each edit as its own edit document. Failures are skipped.
    async fn write_edits(&self, edits: &[Value]) -> EditsWritten {
        let device = &self.config.device;
        let mut outcome = EditsWritten::default();

        for edit in edits {
            let Value::Object(fields) = edit else {
                tracing::warn!("skipping edit that is not an object");
                outcome.failed += 1;
                continue;
            };

            let mut document = edit_document(fields);
            document.insert("contexts".into(), json!(device.contexts));
            document.insert("modifiedAt".into(), json!(Timestamp::now()));

            let edit_id = generate_edit_id();
            let path = DocPath::edit(&device.organization_id, &device.device_id, &edit_id);
            match self.cloud.write(&path, document, WriteOptions::default()).await {
                Ok(()) => {
                    outcome.written += 1;
                    if fields.get("typeEdit").and_then(Value::as_str) == Some("containerIsUploaded")
                    {
                        outcome.containers_uploaded += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(%path, error = %e, "failed to write edit document");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

fn decode_options<T: DeserializeOwned + Default>(action: NamedAction, options: Value) -> Result<T> {
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options).map_err(|e| EngineError::InvalidOptions {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

/// Shape a received edit so it decodes as a cloud document.
///
/// `table` falls back to `_table`, then to [`UNKNOWN_TABLE`];
/// `perFieldTimestamp` falls back to `_ts`, then to an empty map.
fn edit_document(fields: &Map<String, Value>) -> Document {
    let mut document = fields.clone();
    if !fields.get("table").is_some_and(Value::is_string) {
        let table = fields
            .get("_table")
            .filter(|t| t.is_string())
            .cloned()
            .unwrap_or_else(|| json!(UNKNOWN_TABLE));
        document.insert("table".into(), table);
    }
    if !fields.get("perFieldTimestamp").is_some_and(Value::is_object) {
        let stamps = fields
            .get("_ts")
            .filter(|t| t.is_object())
            .cloned()
            .unwrap_or_else(|| json!({}));
        document.insert("perFieldTimestamp".into(), stamps);
    }
    document
}

fn generate_edit_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(EDIT_ID_LEN)
        .map(char::from)
        .collect()
}
