//! Wire shapes exchanged with the runtime.
//!
//! Outbound calls are wrapped in a [`CallEnvelope`] and handed to the
//! webhook script. Replies come back as loosely typed JSON; [`Callback`]
//! decodes them, applying truthiness to `success`/`error` and normalising
//! every error shape into a [`RemoteError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// Code used when a structured error carries no code of its own.
const DEFAULT_ERROR_CODE: &str = "1";

/// What the webhook script receives for a correlated call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnvelope<'a> {
    pub id: u64,
    /// JSON text of the call's payload.
    pub script_parameter: &'a str,
    pub script_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct RawCallback {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    success: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    error_message: Value,
}

/// A decoded callback from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    /// `None` when the id is missing or not a non-negative integer.
    pub id: Option<u64>,
    /// Present only when the runtime's `success` was truthy.
    pub success: Option<Value>,
    /// Present only when the runtime's `error` was truthy.
    pub error: Option<RemoteError>,
}

impl Callback {
    /// Decode the serialized callback text.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawCallback = serde_json::from_str(text)?;

        let success = is_truthy(&raw.success).then_some(raw.success);
        let error = is_truthy(&raw.error).then(|| normalize_error(&raw.error, &raw.error_message));

        Ok(Self {
            id: parse_id(&raw.id),
            success,
            error,
        })
    }
}

/// Ids arrive as numbers or as numeric strings.
fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose truthiness: null, false, zero and the empty string are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Normalise any error shape into `{code, message, raw}`.
pub fn normalize_error(error: &Value, error_message: &Value) -> RemoteError {
    match error {
        Value::Object(_) | Value::Array(_) => structured(error, DEFAULT_ERROR_CODE.to_string()),
        Value::String(s) => {
            let text = s.trim();
            if text.starts_with('{') || text.starts_with('[') {
                if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
                    serde_json::from_str::<Value>(text)
                {
                    return structured(&parsed, s.clone());
                }
            }
            RemoteError::new(s.clone(), optional_text(error_message))
        }
        other => RemoteError::new(scalar_text(other), optional_text(error_message)),
    }
}

fn structured(value: &Value, fallback_code: String) -> RemoteError {
    let field = |key: &str| value.get(key).filter(|v| !v.is_null());

    RemoteError {
        code: field("code")
            .or_else(|| field("error"))
            .map(scalar_text)
            .unwrap_or(fallback_code),
        message: field("message")
            .or_else(|| field("error_message"))
            .map(scalar_text),
        raw: Some(value.clone()),
    }
}

fn optional_text(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| scalar_text(value))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
