//! A scripted dispatcher for unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use fieldsync_bridge::{BridgeError, CallOptions, Dispatch, RemoteError, Result};

/// Records every call and fails or refuses the ones it was told to.
#[derive(Default)]
pub struct ScriptedDispatcher {
    calls: Mutex<Vec<(String, Value)>>,
    posted: Mutex<Vec<Value>>,
    failing: Mutex<HashSet<usize>>,
    refusing: Mutex<HashSet<usize>>,
    fail_all: Mutex<bool>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for a permit from the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let dispatcher = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (dispatcher, gate)
    }

    /// Fail the `n`th call (zero-based).
    pub fn fail_call(&self, n: usize) {
        self.failing.lock().unwrap().insert(n);
    }

    /// Answer the `n`th call with `{"success": false}` instead of failing it.
    pub fn refuse_call(&self, n: usize) {
        self.refusing.lock().unwrap().insert(n);
    }

    pub fn fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// The `updates` arrays of every call, in order.
    pub fn batches(&self) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .map(|(_, payload)| payload["updates"].as_array().cloned().unwrap_or_default())
            .collect()
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatch for ScriptedDispatcher {
    async fn call(&self, script: &str, payload: &Value, _options: CallOptions) -> Result<Value> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((script.to_string(), payload.clone()));
            calls.len() - 1
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let fail = *self.fail_all.lock().unwrap() || self.failing.lock().unwrap().contains(&index);
        if fail {
            return Err(BridgeError::Remote(RemoteError::new(
                "500",
                Some("rejected by test".into()),
            )));
        }
        if self.refusing.lock().unwrap().contains(&index) {
            return Ok(json!({"success": false, "error": "refused by test"}));
        }
        Ok(json!({"success": true}))
    }

    fn post(&self, payload: Value) {
        self.posted.lock().unwrap().push(payload);
    }
}
