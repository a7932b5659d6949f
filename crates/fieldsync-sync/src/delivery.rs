//! Sending one batch and reading the runtime's answer.
//!
//! The bridge resolves a call with whatever the runtime put in its
//! `success` slot. That value can itself carry `"success": false` when the
//! local store rejected the batch, so an `Ok` from the dispatcher is not yet
//! an acknowledgement.

use serde::Serialize;
use serde_json::Value;

use fieldsync_bridge::{BridgeError, CallOptions, Dispatch};

use crate::error::{Result, SyncError};
use crate::queue::BatchPayload;

/// Send one batch and require a positive answer.
pub async fn deliver<D, T>(dispatcher: &D, script: &str, payload: &BatchPayload<'_, T>) -> Result<Value>
where
    D: Dispatch,
    T: Serialize,
{
    let value = serde_json::to_value(payload).map_err(BridgeError::from)?;
    let reply = dispatcher.call(script, &value, CallOptions::default()).await?;
    match refusal(&reply) {
        Some(reason) => Err(SyncError::Refused(reason)),
        None => Ok(reply),
    }
}

/// Why a reply refuses the batch, or `None` if it acknowledges it.
///
/// A bare `false`, or an object whose `success` is present and falsy, is a
/// refusal. Anything else, including a reply with no `success` at all, counts
/// as an acknowledgement.
pub fn refusal(reply: &Value) -> Option<String> {
    let refused = match reply {
        Value::Bool(false) => true,
        Value::Object(map) => map.get("success").is_some_and(|s| !is_truthy(s)),
        _ => false,
    };
    if !refused {
        return None;
    }
    let reason = match reply.get("error").or_else(|| reply.get("message")) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "runtime did not confirm the batch".to_string(),
    };
    Some(reason)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
