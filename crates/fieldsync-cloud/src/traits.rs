//! The cloud store trait and its query and notification types.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use fieldsync_core::{Document, Timestamp};

use crate::error::{CloudError, Result};
use crate::path::DocPath;

/// One notification cycle, or the error that ended the stream.
pub type ChangeBatch = std::result::Result<Vec<ChangeNotification>, CloudError>;

/// Filter for an updates subscription.
///
/// Two queries built from the same collection, contexts and lower bound are
/// equal, so resubscribing with an unchanged watermark is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdatesQuery {
    pub collection: DocPath,
    /// Match documents routed to any of these.
    pub contexts: BTreeSet<String>,
    /// Match documents modified strictly after this instant.
    pub after: Timestamp,
}

impl UpdatesQuery {
    pub fn new(
        collection: DocPath,
        contexts: impl IntoIterator<Item = impl Into<String>>,
        after: Timestamp,
    ) -> Self {
        Self {
            collection,
            contexts: contexts.into_iter().map(Into::into).collect(),
            after,
        }
    }

    /// Whether a raw document satisfies the filter.
    ///
    /// An empty context set matches nothing.
    pub fn matches(&self, document: &Document) -> bool {
        let modified_after = document
            .get("modifiedAt")
            .and_then(Value::as_i64)
            .is_some_and(|ms| Timestamp::from_millis(ms) > self.after);

        let routed = document
            .get("contexts")
            .and_then(Value::as_array)
            .is_some_and(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .any(|tag| self.contexts.contains(tag))
            });

        modified_after && routed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A change to one document in a subscribed collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub doc_id: String,
    pub document: Document,
}

/// A live change stream. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    query: UpdatesQuery,
    rx: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl Subscription {
    /// Create a subscription and the sender that feeds it.
    pub fn channel(id: u64, query: UpdatesQuery) -> (mpsc::UnboundedSender<ChangeBatch>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { id, query, rx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query(&self) -> &UpdatesQuery {
        &self.query
    }

    /// The next notification cycle; `None` once the store closed the stream.
    pub async fn next(&mut self) -> Option<ChangeBatch> {
        self.rx.recv().await
    }
}

/// Write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Merge top-level keys into an existing document instead of replacing it.
    pub merge: bool,
}

impl WriteOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A cloud document store.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CloudStore: Send + Sync + 'static {
    /// Open a change stream over `query.collection`.
    ///
    /// The first cycle reports every matching document as added.
    async fn subscribe(&self, query: UpdatesQuery) -> Result<Subscription>;

    /// Write a document.
    async fn write(&self, path: &DocPath, document: Document, options: WriteOptions) -> Result<()>;

    /// Read a document, `None` if absent.
    async fn read(&self, path: &DocPath) -> Result<Option<Document>>;
}
