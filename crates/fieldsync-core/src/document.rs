//! Cloud documents and the minimal updates derived from them.
//!
//! Both types flatten their field values into the top-level JSON object,
//! next to the bookkeeping keys, which is how the cloud store and the local
//! runtime exchange records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::{BatchGroup, Timestamp};

/// A raw document as handed over by the cloud store.
pub type Document = Map<String, Value>;

/// A record as stored in the cloud.
///
/// Every field ever written carries its own timestamp in
/// `per_field_timestamp`; `modified_at` is the instant the cloud last
/// rewrote the document and `contexts` routes it to subscribed devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudDocument {
    #[serde(default)]
    pub id: String,
    pub table: String,
    #[serde(default)]
    pub per_field_timestamp: BTreeMap<String, Timestamp>,
    pub modified_at: Timestamp,
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_container: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CloudDocument {
    /// Decode a raw document. An empty or missing `id` falls back to the
    /// store's document id.
    pub fn from_document(doc_id: &str, document: &Document) -> Result<Self> {
        let mut decoded: CloudDocument = serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| CoreError::InvalidDocument {
                id: doc_id.to_string(),
                reason: e.to_string(),
            })?;
        if decoded.id.is_empty() {
            decoded.id = doc_id.to_string();
        }
        Ok(decoded)
    }

    /// Encode back into a raw document.
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::InvalidDocument {
                id: self.id.clone(),
                reason: format!("encoded to non-object {other}"),
            }),
        }
    }

    pub fn batch_group(&self) -> Option<BatchGroup> {
        BatchGroup::from_parts(self.batch_group_id.as_deref(), self.batch_group_size)
    }

    /// True when the document is routed to any of `contexts`.
    pub fn routed_to_any<'a>(&self, contexts: impl IntoIterator<Item = &'a String>) -> bool {
        contexts.into_iter().any(|c| self.contexts.contains(c))
    }
}

/// The subset of a cloud document that is new to the device.
///
/// Only fields whose timestamp is past the watermark are carried; unchanged
/// fields are never retransmitted to the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalUpdate {
    pub table: String,
    pub id: String,
    /// The cloud modification instant of the source document.
    #[serde(rename = "modifiedAt")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub per_field_timestamp: BTreeMap<String, Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_container: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Cloud document this update was shaped from. Stays on this side.
    #[serde(skip)]
    pub source: Option<String>,
}

impl MinimalUpdate {
    pub fn with_source(mut self, doc_id: impl Into<String>) -> Self {
        self.source = Some(doc_id.into());
        self
    }

    pub fn batch_group(&self) -> Option<BatchGroup> {
        BatchGroup::from_parts(self.batch_group_id.as_deref(), self.batch_group_size)
    }

    /// Key identifying the record this update targets.
    pub fn record_key(&self) -> String {
        format!("{}/{}", self.table, self.id)
    }

    /// Identity inside a batch group: the source document when known.
    ///
    /// Two documents touching the same record are two members; the same
    /// document delivered twice is one.
    pub fn member_key(&self) -> String {
        self.source.clone().unwrap_or_else(|| self.record_key())
    }
}
