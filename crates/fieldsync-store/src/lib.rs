//! # fieldsync Store
//!
//! Durable local sync state: the device watermark and the journal of
//! outbound edits awaiting acknowledgement.
//!
//! ## Implementations
//!
//! - [`SqliteStateStore`] - Production backend using SQLite
//! - [`MemoryStateStore`] - In-memory backend for testing

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use traits::StateStore;
