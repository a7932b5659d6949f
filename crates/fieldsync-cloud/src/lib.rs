//! # fieldsync Cloud
//!
//! The cloud document store as the engine sees it: a change stream over a
//! filtered collection, document writes (optionally merged) and reads.
//!
//! The real SDK lives behind [`CloudStore`]; [`MemoryCloudStore`] implements
//! it in memory for tests and standalone runs.

pub mod device;
pub mod error;
pub mod memory;
pub mod path;
pub mod traits;

pub use device::DeviceRecord;
pub use error::{CloudError, Result};
pub use memory::MemoryCloudStore;
pub use path::DocPath;
pub use traits::{
    ChangeBatch, ChangeKind, ChangeNotification, CloudStore, Subscription, UpdatesQuery,
    WriteOptions,
};
