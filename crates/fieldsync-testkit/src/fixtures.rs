//! Test fixtures and helpers.
//!
//! Runtimes that stand in for the host, document builders and a ready-made
//! engine over in-memory stores.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use fieldsync::{DeviceMode, Engine, EngineConfig};
use fieldsync_bridge::{Bridge, BridgeConfig, Result as BridgeResult, Runtime, WeakBridge, WEBHOOK_SCRIPT};
use fieldsync_cloud::{DocPath, MemoryCloudStore};
use fieldsync_core::{Document, RecordEdit, Timestamp};
use fieldsync_store::MemoryStateStore;

/// Builds the callback body (everything but `id`) for a script call.
pub type Responder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// One script call as the runtime received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub id: Option<u64>,
    pub script: String,
    pub payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    id: u64,
    script_name: String,
    script_parameter: String,
}

/// Decode what the bridge hands to `invoke`.
fn decode(script: &str, parameter: &str) -> Invocation {
    let parse = |text: &str| serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into()));
    match serde_json::from_str::<Envelope>(parameter) {
        Ok(envelope) if script == WEBHOOK_SCRIPT => Invocation {
            id: Some(envelope.id),
            script: envelope.script_name,
            payload: parse(&envelope.script_parameter),
        },
        _ => Invocation {
            id: None,
            script: script.to_string(),
            payload: parse(parameter),
        },
    }
}

/// Answers every call at once through `callback`, like a healthy host.
pub struct LoopbackRuntime {
    bridge: WeakBridge,
    responder: RwLock<Responder>,
    invocations: Mutex<Vec<Invocation>>,
}

impl LoopbackRuntime {
    /// Inject a loopback runtime into `bridge` that answers with `responder`.
    pub fn attach(bridge: &Bridge, responder: Responder) -> Arc<Self> {
        let runtime = Arc::new(Self {
            bridge: bridge.downgrade(),
            responder: RwLock::new(responder),
            invocations: Mutex::new(Vec::new()),
        });
        bridge.inject_runtime(runtime.clone());
        runtime
    }

    /// Answers every call with `{success: {success: true}}`.
    pub fn succeeding(bridge: &Bridge) -> Arc<Self> {
        Self::attach(bridge, succeed())
    }

    pub fn set_responder(&self, responder: Responder) {
        *self.responder.write().unwrap_or_else(PoisonError::into_inner) = responder;
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads of every call to `script`, in order.
    pub fn payloads_for(&self, script: &str) -> Vec<Value> {
        self.invocations()
            .into_iter()
            .filter(|i| i.script == script)
            .map(|i| i.payload)
            .collect()
    }
}

impl Runtime for LoopbackRuntime {
    fn invoke(&self, script: &str, parameter: &str) -> BridgeResult<()> {
        let invocation = decode(script, parameter);
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        let Some(id) = invocation.id else {
            return Ok(());
        };
        let responder = self
            .responder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut reply = match responder(&invocation.script, &invocation.payload) {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("success".into(), other);
                map
            }
        };
        reply.insert("id".into(), json!(id));

        if let Some(bridge) = self.bridge.upgrade() {
            bridge.callback(&Value::Object(reply).to_string());
        }
        Ok(())
    }
}

/// Records calls and never answers; tests settle them by hand.
#[derive(Default)]
pub struct ManualRuntime {
    invocations: Mutex<Vec<Invocation>>,
}

impl ManualRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Correlation id of the most recent call.
    pub fn last_id(&self) -> Option<u64> {
        self.invocations().iter().rev().find_map(|i| i.id)
    }
}

impl Runtime for ManualRuntime {
    fn invoke(&self, script: &str, parameter: &str) -> BridgeResult<()> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(decode(script, parameter));
        Ok(())
    }
}

/// Responder acknowledging every call.
pub fn succeed() -> Responder {
    Arc::new(|_, _| json!({"success": {"success": true}}))
}

/// Responder rejecting calls to `script` with `code`; others succeed.
pub fn reject_script(script: &'static str, code: &'static str) -> Responder {
    Arc::new(move |called, _| {
        if called == script {
            json!({"error": {"code": code, "message": format!("{script} rejected")}})
        } else {
            json!({"success": {"success": true}})
        }
    })
}

/// Builder for raw cloud update documents.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    id: String,
    table: String,
    fields: Map<String, Value>,
    stamps: Map<String, Value>,
    contexts: Vec<String>,
    modified_at: Option<i64>,
    group: Option<(String, u32)>,
}

impl DocumentBuilder {
    pub fn new(id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            table: table.into(),
            fields: Map::new(),
            stamps: Map::new(),
            contexts: vec!["north".to_string()],
            modified_at: None,
            group: None,
        }
    }

    pub fn field(mut self, name: &str, value: Value, at: i64) -> Self {
        self.fields.insert(name.to_string(), value);
        self.stamps.insert(name.to_string(), json!(at));
        self
    }

    pub fn contexts<I, T>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults to the newest field timestamp.
    pub fn modified_at(mut self, at: i64) -> Self {
        self.modified_at = Some(at);
        self
    }

    pub fn in_group(mut self, id: impl Into<String>, size: u32) -> Self {
        self.group = Some((id.into(), size));
        self
    }

    pub fn build(self) -> Document {
        let modified_at = self.modified_at.unwrap_or_else(|| {
            self.stamps
                .values()
                .filter_map(Value::as_i64)
                .max()
                .unwrap_or(0)
        });

        let mut document = self.fields;
        document.insert("id".into(), json!(self.id));
        document.insert("table".into(), json!(self.table));
        document.insert("modifiedAt".into(), json!(modified_at));
        document.insert("contexts".into(), json!(self.contexts));
        document.insert("perFieldTimestamp".into(), Value::Object(self.stamps));
        if let Some((id, size)) = self.group {
            document.insert("batchGroupId".into(), json!(id));
            document.insert("batchGroupSize".into(), json!(size));
        }
        document
    }
}

/// A one-field edit stamped at `at`.
pub fn edit(record_id: &str, at: i64) -> RecordEdit {
    RecordEdit::new(record_id, "Jobs").with_field("name", json!(record_id), Timestamp::from_millis(at))
}

/// A random alphanumeric id.
pub fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Poll `condition` every 10ms for up to 2s of runtime time.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// The engine type the fixtures build.
pub type MemoryEngine = Engine<MemoryCloudStore, MemoryStateStore>;

/// An engine over in-memory stores with a loopback runtime attached.
pub struct EngineFixture {
    pub engine: Arc<MemoryEngine>,
    pub runtime: Arc<LoopbackRuntime>,
}

impl EngineFixture {
    /// Organization `org`, a random device id, contexts `["north"]`.
    pub fn new(mode: DeviceMode) -> Self {
        let mut config = EngineConfig::default();
        config.device.organization_id = "org".into();
        config.device.device_id = format!("DEV_{}", random_id(8));
        config.device.mode = mode;
        config.device.contexts = vec!["north".into()];
        Self::with_config(config)
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_stores(config, MemoryCloudStore::new(), MemoryStateStore::new())
    }

    pub fn with_stores(config: EngineConfig, cloud: MemoryCloudStore, store: MemoryStateStore) -> Self {
        let bridge = Bridge::new(BridgeConfig {
            probe_interval: Duration::from_millis(5),
            probe_timeout: Duration::from_millis(50),
        });
        let runtime = LoopbackRuntime::succeeding(&bridge);
        let engine = Arc::new(Engine::new(config, bridge, cloud, store));
        Self { engine, runtime }
    }

    pub fn cloud(&self) -> &MemoryCloudStore {
        self.engine.cloud()
    }

    pub fn device_id(&self) -> &str {
        &self.engine.config().device.device_id
    }

    /// Publish an update document into the organization's updates collection.
    pub fn publish(&self, doc_id: &str, document: Document) {
        let org = &self.engine.config().device.organization_id;
        self.cloud().put(&DocPath::update(org, doc_id), document);
    }
}
