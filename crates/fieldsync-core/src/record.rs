//! Record edits: changes that originate on the device.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::{BatchGroup, Timestamp};

/// A locally originated change to one record.
///
/// Immutable once enqueued. The outbound queue owns it until the cloud side
/// acknowledges the batch that carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEdit {
    pub record_id: String,
    pub table: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub per_field_timestamp: BTreeMap<String, Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_group_size: Option<u32>,
}

impl RecordEdit {
    pub fn new(record_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            table: table.into(),
            fields: Map::new(),
            per_field_timestamp: BTreeMap::new(),
            batch_group_id: None,
            batch_group_size: None,
        }
    }

    /// Set a field value together with its timestamp.
    pub fn with_field(mut self, name: impl Into<String>, value: Value, at: Timestamp) -> Self {
        let name = name.into();
        self.per_field_timestamp.insert(name.clone(), at);
        self.fields.insert(name, value);
        self
    }

    pub fn in_group(mut self, id: impl Into<String>, size: u32) -> Self {
        self.batch_group_id = Some(id.into());
        self.batch_group_size = Some(size);
        self
    }

    pub fn batch_group(&self) -> Option<BatchGroup> {
        BatchGroup::from_parts(self.batch_group_id.as_deref(), self.batch_group_size)
    }

    /// The newest field timestamp carried by this edit.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.per_field_timestamp.values().copied().max()
    }

    /// Check the structural requirements for enqueueing.
    pub fn validate(&self) -> Result<()> {
        if self.record_id.is_empty() {
            return Err(CoreError::InvalidEdit("empty record id".into()));
        }
        if self.table.is_empty() {
            return Err(CoreError::InvalidEdit(format!(
                "record {} has no table",
                self.record_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_tracks_field_timestamps() {
        let edit = RecordEdit::new("R1", "Jobs")
            .with_field("name", json!("Pump"), Timestamp::from_millis(100))
            .with_field("qty", json!(3), Timestamp::from_millis(50));

        assert_eq!(edit.fields["name"], json!("Pump"));
        assert_eq!(edit.latest_timestamp(), Some(Timestamp::from_millis(100)));
        assert!(edit.batch_group().is_none());
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let edit = RecordEdit::new("R1", "Jobs")
            .with_field("name", json!("Pump"), Timestamp::from_millis(100))
            .in_group("g1", 2);
        let value = serde_json::to_value(&edit).unwrap();
        assert_eq!(value["recordId"], json!("R1"));
        assert_eq!(value["perFieldTimestamp"]["name"], json!(100));
        assert_eq!(value["batchGroupSize"], json!(2));
    }

    #[test]
    fn test_validate_rejects_missing_identity() {
        assert!(RecordEdit::new("", "Jobs").validate().is_err());
        assert!(RecordEdit::new("R1", "").validate().is_err());
        assert!(RecordEdit::new("R1", "Jobs").validate().is_ok());
    }
}
