//! Field-level delta computation.
//!
//! A field of a cloud document is new to the device iff its timestamp is
//! strictly greater than the device watermark. Two fields of one record may
//! come from different origins at different instants, so the decision is made
//! per field, never per record.

use std::collections::BTreeSet;

use serde_json::Map;

use crate::document::{CloudDocument, MinimalUpdate};
use crate::types::Timestamp;

/// Names of the fields whose timestamp exceeds `watermark`.
pub fn changed_fields(document: &CloudDocument, watermark: Timestamp) -> BTreeSet<String> {
    document
        .per_field_timestamp
        .iter()
        .filter(|(_, ts)| **ts > watermark)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Build the minimal update carrying only `changed` fields.
///
/// A changed field whose value is absent from the document keeps its
/// timestamp but carries no value.
pub fn shape_update(document: &CloudDocument, changed: &BTreeSet<String>) -> MinimalUpdate {
    let mut fields = Map::new();
    let mut per_field_timestamp = std::collections::BTreeMap::new();

    for name in changed {
        if let Some(ts) = document.per_field_timestamp.get(name) {
            per_field_timestamp.insert(name.clone(), *ts);
        }
        if let Some(value) = document.fields.get(name) {
            fields.insert(name.clone(), value.clone());
        }
    }

    MinimalUpdate {
        table: document.table.clone(),
        id: document.id.clone(),
        timestamp: document.modified_at,
        per_field_timestamp,
        batch_group_id: document.batch_group_id.clone(),
        batch_group_size: document.batch_group_size,
        pending_container: document.pending_container.clone(),
        fields,
        source: None,
    }
}

/// Filter and shape in one step.
///
/// Returns `None` when every field is at or below the watermark, i.e. the
/// document holds nothing new for this device.
pub fn reconcile_document(document: &CloudDocument, watermark: Timestamp) -> Option<MinimalUpdate> {
    let changed = changed_fields(document, watermark);
    if changed.is_empty() {
        return None;
    }
    Some(shape_update(document, &changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn document(stamps: &[(&str, i64)]) -> CloudDocument {
        let mut fields = Map::new();
        let mut per_field_timestamp = BTreeMap::new();
        for (name, ts) in stamps {
            fields.insert(name.to_string(), json!(format!("{name}-value")));
            per_field_timestamp.insert(name.to_string(), Timestamp::from_millis(*ts));
        }
        CloudDocument {
            id: "R1".into(),
            table: "Jobs".into(),
            per_field_timestamp,
            modified_at: Timestamp::from_millis(500),
            contexts: vec!["north".into()],
            batch_group_id: None,
            batch_group_size: None,
            pending_container: None,
            fields,
        }
    }

    #[test]
    fn test_only_newer_fields_survive() {
        let doc = document(&[("name", 100), ("qty", 50)]);
        let update = reconcile_document(&doc, Timestamp::from_millis(60)).unwrap();

        assert_eq!(update.fields.len(), 1);
        assert_eq!(update.fields["name"], json!("name-value"));
        assert_eq!(
            update.per_field_timestamp.get("name"),
            Some(&Timestamp::from_millis(100))
        );
        assert!(!update.per_field_timestamp.contains_key("qty"));
    }

    #[test]
    fn test_field_at_watermark_is_not_new() {
        let doc = document(&[("name", 60)]);
        assert!(reconcile_document(&doc, Timestamp::from_millis(60)).is_none());
    }

    #[test]
    fn test_nothing_new_discards_document() {
        let doc = document(&[("name", 10), ("qty", 20)]);
        assert!(reconcile_document(&doc, Timestamp::from_millis(20)).is_none());
    }

    #[test]
    fn test_shape_carries_batch_group_and_container() {
        let mut doc = document(&[("name", 100)]);
        doc.batch_group_id = Some("g1".into());
        doc.batch_group_size = Some(3);
        doc.pending_container = Some(json!({"file": "photo.jpg"}));

        let update = reconcile_document(&doc, Timestamp::ZERO).unwrap();
        assert_eq!(update.batch_group_id.as_deref(), Some("g1"));
        assert_eq!(update.batch_group_size, Some(3));
        assert_eq!(update.pending_container, Some(json!({"file": "photo.jpg"})));
        assert_eq!(update.timestamp, Timestamp::from_millis(500));
    }

    #[test]
    fn test_timestamp_without_value() {
        let mut doc = document(&[("name", 100)]);
        doc.fields.remove("name");
        let update = reconcile_document(&doc, Timestamp::ZERO).unwrap();
        assert!(update.fields.is_empty());
        assert_eq!(update.per_field_timestamp.len(), 1);
    }

    proptest! {
        #[test]
        fn delta_contains_exactly_newer_fields(
            stamps in prop::collection::btree_map("[a-z]{1,8}", 0i64..1_000, 0..12),
            watermark in 0i64..1_000,
        ) {
            let mut doc = document(&[]);
            for (name, ts) in &stamps {
                doc.fields.insert(name.clone(), Value::from(*ts));
                doc.per_field_timestamp.insert(name.clone(), Timestamp::from_millis(*ts));
            }
            let watermark = Timestamp::from_millis(watermark);

            match reconcile_document(&doc, watermark) {
                Some(update) => {
                    for (name, ts) in &doc.per_field_timestamp {
                        prop_assert_eq!(update.fields.contains_key(name), *ts > watermark);
                        prop_assert_eq!(update.per_field_timestamp.contains_key(name), *ts > watermark);
                    }
                }
                None => {
                    prop_assert!(doc.per_field_timestamp.values().all(|ts| *ts <= watermark));
                }
            }
        }
    }
}
