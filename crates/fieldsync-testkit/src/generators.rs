//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;

use fieldsync_core::{CloudDocument, RecordEdit, Timestamp};

/// Generate a timestamp in a small range, so collisions with the watermark
/// actually happen.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0i64..1_000).prop_map(Timestamp::from_millis)
}

/// Generate a field name.
pub fn field_name() -> impl Strategy<Value = String> {
    "f_[a-z0-9]{1,6}".prop_map(String::from)
}

/// Generate per-field timestamps for one document.
pub fn field_stamps() -> impl Strategy<Value = BTreeMap<String, Timestamp>> {
    prop::collection::btree_map(field_name(), timestamp(), 1..8)
}

/// Generate a cloud document whose field values are their own names.
pub fn cloud_document() -> impl Strategy<Value = CloudDocument> {
    ("[A-Z]{2}[0-9]{3}", field_stamps()).prop_map(|(id, stamps)| {
        let fields = stamps
            .keys()
            .map(|name| (name.clone(), json!(name)))
            .collect();
        let modified_at = stamps.values().copied().max().unwrap_or_default();
        CloudDocument {
            id,
            table: "Jobs".to_string(),
            per_field_timestamp: stamps,
            modified_at,
            contexts: vec!["north".to_string()],
            batch_group_id: None,
            batch_group_size: None,
            pending_container: None,
            fields,
        }
    })
}

/// Generate a valid record edit.
pub fn record_edit() -> impl Strategy<Value = RecordEdit> {
    ("[A-Z]{2}[0-9]{3}", field_stamps()).prop_map(|(id, stamps)| {
        stamps
            .into_iter()
            .fold(RecordEdit::new(id, "Jobs"), |edit, (name, at)| {
                let value = json!(at.as_millis());
                edit.with_field(name, value, at)
            })
    })
}

/// Parameters for one batch group and the order its members arrive in.
#[derive(Debug, Clone)]
pub struct GroupArrival {
    pub group_id: String,
    /// Member timestamps in arrival order.
    pub timestamps: Vec<Timestamp>,
}

impl GroupArrival {
    pub fn size(&self) -> u32 {
        self.timestamps.len() as u32
    }

    /// The candidate the group yields once complete.
    pub fn latest(&self) -> Timestamp {
        self.timestamps.iter().copied().max().unwrap_or_default()
    }
}

impl Arbitrary for GroupArrival {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        ("g[0-9]{1,4}", prop::collection::vec(1i64..1_000, 1..8))
            .prop_flat_map(|(group_id, stamps)| {
                Just(stamps)
                    .prop_shuffle()
                    .prop_map(move |shuffled| GroupArrival {
                        group_id: group_id.clone(),
                        timestamps: shuffled.into_iter().map(Timestamp::from_millis).collect(),
                    })
            })
            .boxed()
    }
}
