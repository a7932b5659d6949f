//! Local stand-in for an absent runtime.
//!
//! When no runtime is injected within the probe bound, calls are answered
//! here with plausible responses so the engine can run standalone.

use serde_json::{json, Value};

use crate::runtime::{RETURN_RESULT_SCRIPT, UPLOAD_COMPLETE_SCRIPT, WEBHOOK_SCRIPT};

/// Script that applies inbound updates to the local store.
pub const INBOUND_DISPATCH_SCRIPT: &str = "API - Web Sync Inbound dispatcher {payload}";

/// Script that receives outbound edits for the cloud.
pub const OUTBOUND_DISPATCH_SCRIPT: &str = "API - Web Sync Outbound dispatcher {payload}";

/// Synthesises a response per script name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockResponder;

impl MockResponder {
    pub fn respond(&self, script: &str, parameter: &str) -> Value {
        tracing::debug!(script, "answering from mock responder");

        match script {
            INBOUND_DISPATCH_SCRIPT | OUTBOUND_DISPATCH_SCRIPT => {
                let (count, remaining) = batch_shape(parameter);
                json!({
                    "success": true,
                    "message": format!("Processed {count} updates successfully (mocked)"),
                    "data": { "recordsProcessed": count, "remaining": remaining },
                })
            }
            UPLOAD_COMPLETE_SCRIPT => {
                json!({ "success": true, "message": "Upload completed (mocked)" })
            }
            WEBHOOK_SCRIPT => json!({ "success": true, "message": "Webhook received (mocked)" }),
            RETURN_RESULT_SCRIPT => json!({ "success": true, "data": parameter }),
            other => {
                tracing::debug!(script = other, "unknown script in mock responder");
                json!({ "success": true, "message": format!("Script {other} executed (mocked)") })
            }
        }
    }
}

/// `(updates.len(), remaining)` of a batch payload, zero when absent.
fn batch_shape(parameter: &str) -> (usize, u64) {
    let parsed: Value = serde_json::from_str(parameter).unwrap_or(Value::Null);
    let count = parsed
        .get("updates")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let remaining = parsed
        .get("remaining")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    (count, remaining)
}
