//! # fieldsync Testkit
//!
//! Testing utilities for fieldsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: runtimes standing in for the host (answering at once, or
//!   only when told to), cloud document builders, and a ready engine over
//!   in-memory stores
//! - **Generators**: proptest strategies for documents, edits and batch-group
//!   arrival orders
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use fieldsync::DeviceMode;
//! use fieldsync_testkit::fixtures::{DocumentBuilder, EngineFixture};
//! use serde_json::json;
//!
//! async fn example() {
//!     let fixture = EngineFixture::new(DeviceMode::Active);
//!     fixture.engine.start().await.unwrap();
//!     fixture.publish(
//!         "U1",
//!         DocumentBuilder::new("R1", "Jobs").field("name", json!("Pump"), 100).build(),
//!     );
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use fieldsync_testkit::generators::GroupArrival;
//!
//! proptest! {
//!     #[test]
//!     fn group_yields_its_latest(arrival: GroupArrival) {
//!         // feed arrival.timestamps to a tracker, expect arrival.latest()
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    edit, eventually, random_id, reject_script, succeed, DocumentBuilder, EngineFixture,
    Invocation, LoopbackRuntime, ManualRuntime, MemoryEngine, Responder,
};
pub use generators::{cloud_document, field_stamps, record_edit, timestamp, GroupArrival};
