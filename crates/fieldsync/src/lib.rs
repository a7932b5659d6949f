//! # fieldsync
//!
//! Keeps an embedded local store and a cloud document store eventually
//! consistent over unreliable links, using per-field last-writer-wins
//! timestamps instead of whole-record locking.
//!
//! ## Overview
//!
//! - **Outbound**: local edits are journaled and pushed to the runtime's
//!   outbound dispatcher in bounded, acknowledged batches
//! - **Inbound**: cloud updates past the device watermark are reduced to
//!   their new fields and delivered to the local store; the watermark moves
//!   only once every batch group below it has fully arrived
//! - **Bridge**: the local runtime is reached through one-way script calls
//!   with out-of-band callbacks, correlated into awaitable replies
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fieldsync::{Bridge, Engine, EngineConfig};
//! use fieldsync::cloud::MemoryCloudStore;
//! use fieldsync::store::SqliteStateStore;
//!
//! async fn example() {
//!     let config = EngineConfig::default();
//!     let bridge = Bridge::new(config.bridge.clone());
//!     let store = SqliteStateStore::open("sync-state.db").unwrap();
//!
//!     let engine = Engine::new(config, bridge, MemoryCloudStore::new(), store);
//!     engine.start().await.unwrap();
//!
//!     let reply = engine
//!         .named_action_json(r#"{"name": "editsUpdateStatus", "options": {"currentState": 1}}"#)
//!         .await;
//!     println!("{reply}");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `fieldsync::core` - timestamps, records, documents, delta, tracker
//! - `fieldsync::bridge` - runtime seam and call correlation
//! - `fieldsync::cloud` - cloud store trait and paths
//! - `fieldsync::store` - local state store and SQLite
//! - `fieldsync::sync` - outbound queue and inbound processor

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod status;

// Re-export component crates
pub use fieldsync_bridge as bridge;
pub use fieldsync_cloud as cloud;
pub use fieldsync_core as core;
pub use fieldsync_store as store;
pub use fieldsync_sync as sync;

// Re-export main types for convenience
pub use action::{ActionRequest, ActionResult, NamedAction};
pub use config::{DeviceConfig, DeviceMode, EngineConfig};
pub use engine::{Engine, StartReport};
pub use error::{EngineError, Result};
pub use status::{ContainerProgress, EditsState, StatusBoard};

pub use fieldsync_bridge::{Bridge, BridgeConfig, Runtime};
pub use fieldsync_core::{CloudDocument, Document, MinimalUpdate, RecordEdit, Timestamp};
