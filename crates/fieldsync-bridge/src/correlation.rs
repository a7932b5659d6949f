//! The correlation table.
//!
//! Maps each in-flight call id to the single-shot handle its caller awaits.
//! An entry is created before the runtime is invoked and destroyed by the
//! callback that settles it, so a reply can never race its registration.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::RemoteError;

/// What a caller eventually receives.
pub type Reply = std::result::Result<Value, RemoteError>;

#[derive(Debug)]
struct Entry {
    tx: oneshot::Sender<Reply>,
    fire_and_forget: bool,
}

/// How a callback was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Resolved with the runtime's success value (or the `true` sentinel).
    Resolved(u64),
    /// Rejected with a normalised remote error.
    Rejected(u64, RemoteError),
    /// A fire-and-forget call's error, converted to success.
    Absorbed(u64, RemoteError),
    /// No entry for this id.
    Unmatched(Option<u64>),
    /// The callback payload could not be decoded.
    Malformed,
}

/// Id-keyed pending calls.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and register its completion handle.
    pub fn register(&mut self, fire_and_forget: bool) -> (u64, oneshot::Receiver<Reply>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            Entry {
                tx,
                fire_and_forget,
            },
        );
        (id, rx)
    }

    /// Settle an entry from a decoded callback and remove it.
    ///
    /// Truthy `success` wins. Otherwise an error rejects, unless the call was
    /// fire-and-forget. A callback with neither resolves with `true`.
    pub fn settle(
        &mut self,
        id: Option<u64>,
        success: Option<Value>,
        error: Option<RemoteError>,
    ) -> Settlement {
        let Some((id, entry)) = id.and_then(|id| self.entries.remove(&id).map(|e| (id, e))) else {
            return Settlement::Unmatched(id);
        };

        // A receiver that has gone away just means nobody is listening.
        match (success, error) {
            (Some(value), _) => {
                let _ = entry.tx.send(Ok(value));
                Settlement::Resolved(id)
            }
            (None, Some(error)) if entry.fire_and_forget => {
                let _ = entry.tx.send(Ok(Value::Bool(true)));
                Settlement::Absorbed(id, error)
            }
            (None, Some(error)) => {
                let _ = entry.tx.send(Err(error.clone()));
                Settlement::Rejected(id, error)
            }
            (None, None) => {
                let _ = entry.tx.send(Ok(Value::Bool(true)));
                Settlement::Resolved(id)
            }
        }
    }

    /// Drop an entry without settling it.
    pub fn forget(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
