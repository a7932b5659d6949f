//! Strong type definitions for fieldsync.
//!
//! Identifiers and instants are newtypes so a batch-group id can't be passed
//! where a record id is expected, and a timestamp can't be mixed with a count.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An instant, in milliseconds since the Unix epoch.
///
/// Used for per-field timestamps, document modification instants and the
/// device watermark. Ordering is plain integer ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The Unix epoch.
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// The current wall-clock instant.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

/// Identifier shared by every member of an inbound batch group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchGroupId(pub String);

impl BatchGroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Membership of an item in a batch group with a declared size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchGroup {
    pub id: BatchGroupId,
    /// Declared number of members. Zero is treated as one.
    pub size: u32,
}

impl BatchGroup {
    pub fn new(id: impl Into<String>, size: u32) -> Self {
        Self {
            id: BatchGroupId::new(id),
            size,
        }
    }

    /// Build from the optional wire fields; both must be present.
    pub fn from_parts(id: Option<&str>, size: Option<u32>) -> Option<Self> {
        match (id, size) {
            (Some(id), Some(size)) if !id.is_empty() => Some(Self::new(id, size)),
            _ => None,
        }
    }

    /// The number of members required for completion.
    pub fn expected(&self) -> u32 {
        self.size.max(1)
    }
}
