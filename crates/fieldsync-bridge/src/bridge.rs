//! The invocation bridge.
//!
//! Turns the runtime's one-way `invoke` plus out-of-band `callback` into an
//! awaitable `call`. Every dispatched call is registered in the correlation
//! table before the runtime sees it; the callback settles and removes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use fieldsync_core::serde_util::duration_ms;

use crate::correlation::{CorrelationTable, Settlement};
use crate::envelope::{CallEnvelope, Callback};
use crate::error::{BridgeError, Result};
use crate::mock::MockResponder;
use crate::runtime::{Runtime, RuntimeSlot, RETURN_RESULT_SCRIPT, WEBHOOK_SCRIPT};

/// Configuration for the runtime availability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Delay between two probes for the runtime.
    #[serde(with = "duration_ms")]
    pub probe_interval: Duration,
    /// Total wait before falling back to the mock responder.
    #[serde(with = "duration_ms")]
    pub probe_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// The caller does not need a true success/failure signal.
    pub fire_and_forget: bool,
}

impl CallOptions {
    pub fn fire_and_forget() -> Self {
        Self {
            fire_and_forget: true,
        }
    }
}

/// Anything able to run a script and await its reply.
///
/// [`Bridge`] is the production implementation; the queues are generic over
/// this so they can be driven by scripted dispatchers in tests.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Run `script` with `payload` and await the reply.
    async fn call(&self, script: &str, payload: &Value, options: CallOptions) -> Result<Value>;

    /// Hand a result back to the runtime. Never fails for the caller.
    async fn return_result(&self, payload: &Value) -> Result<Value> {
        self.call(RETURN_RESULT_SCRIPT, payload, CallOptions::fire_and_forget())
            .await
    }

    /// Like `return_result`, but detached from the caller.
    fn post(&self, payload: Value);
}

struct Inner {
    config: BridgeConfig,
    runtime: RuntimeSlot,
    table: Mutex<CorrelationTable>,
    mock: MockResponder,
}

/// Correlates calls to the runtime with their callbacks.
///
/// Cheap to clone; clones share one correlation table.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    /// Create a bridge with no runtime injected yet.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runtime: RuntimeSlot::new(),
                table: Mutex::new(CorrelationTable::new()),
                mock: MockResponder,
            }),
        }
    }

    pub fn with_runtime(config: BridgeConfig, runtime: Arc<dyn Runtime>) -> Self {
        let bridge = Self::new(config);
        bridge.inject_runtime(runtime);
        bridge
    }

    /// Make the runtime available. Calls already probing pick it up.
    pub fn inject_runtime(&self, runtime: Arc<dyn Runtime>) {
        tracing::debug!("runtime injected");
        self.inner.runtime.inject(runtime);
    }

    pub fn eject_runtime(&self) -> Option<Arc<dyn Runtime>> {
        self.inner.runtime.eject()
    }

    pub fn has_runtime(&self) -> bool {
        self.inner.runtime.is_present()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Number of calls awaiting a callback.
    pub fn pending_calls(&self) -> usize {
        self.table().len()
    }

    /// A handle that does not keep the bridge alive.
    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn table(&self) -> MutexGuard<'_, CorrelationTable> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `script` with `payload` and await its reply.
    ///
    /// Without a runtime after the probe bound, the mock responder answers.
    /// A fire-and-forget call always resolves successfully.
    pub async fn call(&self, script: &str, payload: &Value, options: CallOptions) -> Result<Value> {
        let parameter = serde_json::to_string(payload)?;

        let result = match self.wait_for_runtime().await {
            Some(runtime) => self.dispatch(runtime.as_ref(), script, &parameter, options).await,
            None => {
                tracing::debug!(
                    script,
                    timeout_ms = self.inner.config.probe_timeout.as_millis() as u64,
                    "runtime not available, falling back to mock"
                );
                Ok(self.inner.mock.respond(script, &parameter))
            }
        };

        match result {
            Err(e) if options.fire_and_forget => {
                tracing::warn!(script, error = %e, "fire-and-forget call failed, absorbing");
                Ok(Value::Bool(true))
            }
            other => other,
        }
    }

    /// Probe for the runtime at a fixed interval up to the configured bound.
    async fn wait_for_runtime(&self) -> Option<Arc<dyn Runtime>> {
        let deadline = Instant::now() + self.inner.config.probe_timeout;
        loop {
            if let Some(runtime) = self.inner.runtime.get() {
                return Some(runtime);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(self.inner.config.probe_interval).await;
        }
    }

    async fn dispatch(
        &self,
        runtime: &dyn Runtime,
        script: &str,
        parameter: &str,
        options: CallOptions,
    ) -> Result<Value> {
        let (id, rx) = self.table().register(options.fire_and_forget);

        let envelope = CallEnvelope {
            id,
            script_parameter: parameter,
            script_name: script,
        };
        let invoked = serde_json::to_string(&envelope)
            .map_err(BridgeError::from)
            .and_then(|text| runtime.invoke(WEBHOOK_SCRIPT, &text));
        if let Err(e) = invoked {
            self.table().forget(id);
            return Err(e);
        }
        tracing::debug!(id, script, fire_and_forget = options.fire_and_forget, "call dispatched");

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(remote)) => Err(BridgeError::Remote(remote)),
            Err(_) => Err(BridgeError::Abandoned(id)),
        }
    }

    /// Entry point for the runtime's replies.
    ///
    /// Never fails: malformed payloads and unknown ids are logged and dropped.
    pub fn callback(&self, payload: &str) -> Settlement {
        let decoded = match Callback::parse(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed callback");
                return Settlement::Malformed;
            }
        };

        let settlement = self
            .table()
            .settle(decoded.id, decoded.success, decoded.error);

        match &settlement {
            Settlement::Resolved(id) => tracing::debug!(id, "call resolved"),
            Settlement::Rejected(id, e) => tracing::debug!(id, code = %e.code, "call rejected"),
            Settlement::Absorbed(id, e) => tracing::warn!(
                id,
                code = %e.code,
                message = e.message.as_deref().unwrap_or(""),
                "fire-and-forget call reported an error, resolving"
            ),
            Settlement::Unmatched(id) => tracing::warn!(?id, "no pending call for callback"),
            Settlement::Malformed => {}
        }
        settlement
    }

    /// Hand a result back to the runtime as a fire-and-forget call.
    pub async fn return_result(&self, payload: &Value) -> Result<Value> {
        self.call(RETURN_RESULT_SCRIPT, payload, CallOptions::fire_and_forget())
            .await
    }

    /// Post a result without waiting for it.
    ///
    /// Requires a tokio runtime; outside one the result is dropped.
    pub fn post(&self, payload: Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, dropping posted result");
            return;
        };
        let bridge = self.clone();
        handle.spawn(async move {
            let _ = bridge.return_result(&payload).await;
        });
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("runtime", &self.inner.runtime)
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

#[async_trait]
impl Dispatch for Bridge {
    async fn call(&self, script: &str, payload: &Value, options: CallOptions) -> Result<Value> {
        Bridge::call(self, script, payload, options).await
    }

    fn post(&self, payload: Value) {
        Bridge::post(self, payload)
    }
}

/// Non-owning handle to a [`Bridge`], for runtimes that call back into it.
#[derive(Clone)]
pub struct WeakBridge {
    inner: Weak<Inner>,
}

impl WeakBridge {
    pub fn upgrade(&self) -> Option<Bridge> {
        self.inner.upgrade().map(|inner| Bridge { inner })
    }
}
