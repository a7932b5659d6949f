//! The per-device record kept in the cloud.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fieldsync_core::{Document, Timestamp};

use crate::error::{CloudError, Result};

/// `organizations/{org}/devices/{device}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_timestamp: Option<Timestamp>,
    #[serde(default)]
    pub device_type: String,
}

impl DeviceRecord {
    pub fn from_document(document: &Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(document.clone()))?)
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(CloudError::Encoding(format!("device record encoded to {other}"))),
        }
    }

    /// The fields written when the watermark advances; merged into the
    /// existing record.
    pub fn watermark_patch(organization_id: &str, device_id: &str, at: Timestamp) -> Document {
        let mut patch = Document::new();
        patch.insert("deviceId".into(), Value::from(device_id));
        patch.insert("organizationId".into(), Value::from(organization_id));
        patch.insert("watermarkTimestamp".into(), Value::from(at.as_millis()));
        patch
    }

    /// The stored watermark of a raw device document, if any.
    pub fn watermark_of(document: &Document) -> Option<Timestamp> {
        document
            .get("watermarkTimestamp")
            .and_then(Value::as_i64)
            .map(Timestamp::from_millis)
    }
}
