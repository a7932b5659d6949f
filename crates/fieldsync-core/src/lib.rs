//! # fieldsync Core
//!
//! Pure primitives for the fieldsync engine: timestamps, record edits, cloud
//! documents, field-level deltas and batch-group tracking.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! deterministic computation over plain data, so the reconciliation policy
//! can be tested without a runtime.
//!
//! ## Key Types
//!
//! - [`Timestamp`] - Milliseconds since the Unix epoch
//! - [`RecordEdit`] - A change that originated on the device
//! - [`CloudDocument`] - A record as stored in the cloud, with per-field timestamps
//! - [`MinimalUpdate`] - Only the fields of a document that are new to the device
//! - [`BatchTracker`] - Partial-completion state of multi-part inbound batches
//! - [`Watermark`] - The device's monotonic last-confirmed-synced instant
//!
//! ## Field-level last-writer-wins
//!
//! Every field of a record carries its own timestamp. A field is new to the
//! device iff its timestamp is strictly greater than the watermark; see
//! [`delta::changed_fields`].

pub mod delta;
pub mod document;
pub mod error;
pub mod record;
pub mod serde_util;
pub mod tracker;
pub mod types;
pub mod watermark;

pub use delta::{changed_fields, reconcile_document, shape_update};
pub use document::{CloudDocument, Document, MinimalUpdate};
pub use error::{CoreError, Result};
pub use record::RecordEdit;
pub use tracker::{BatchTracker, Observation};
pub use types::{BatchGroup, BatchGroupId, Timestamp};
pub use watermark::{Watermark, WatermarkGate};
