//! In-memory implementation of the CloudStore trait.
//!
//! Keeps documents in a map keyed by path and pushes change notifications
//! to live subscriptions the way a snapshot listener would: an initial cycle
//! with every matching document, then one cycle per write. Failure switches
//! let tests exercise the engine's error paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use fieldsync_core::Document;

use crate::error::{CloudError, Result};
use crate::path::DocPath;
use crate::traits::{
    ChangeBatch, ChangeKind, ChangeNotification, CloudStore, Subscription, UpdatesQuery,
    WriteOptions,
};

/// In-memory cloud store. Thread-safe via RwLock.
pub struct MemoryCloudStore {
    inner: RwLock<MemoryCloudInner>,
}

struct MemoryCloudInner {
    documents: BTreeMap<DocPath, Document>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    /// Every query ever subscribed, in order.
    queries: Vec<UpdatesQuery>,
    fail_writes: bool,
    fail_subscribe: bool,
}

struct Subscriber {
    query: UpdatesQuery,
    tx: mpsc::UnboundedSender<ChangeBatch>,
    /// Doc ids this subscriber currently sees as matching.
    visible: HashSet<String>,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryCloudInner {
                documents: BTreeMap::new(),
                subscribers: Vec::new(),
                next_subscription: 0,
                queries: Vec::new(),
                fail_writes: false,
                fail_subscribe: false,
            }),
        }
    }

    fn state(&self) -> RwLockWriteGuard<'_, MemoryCloudInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a document, bypassing failure injection, and notify.
    pub fn put(&self, path: &DocPath, document: Document) {
        self.state().apply(path, document, false);
    }

    /// Remove a document and notify subscribers that saw it.
    pub fn delete(&self, path: &DocPath) -> Option<Document> {
        let mut state = self.state();
        let removed = state.documents.remove(path)?;
        state.notify(path, None);
        Some(removed)
    }

    pub fn document(&self, path: &DocPath) -> Option<Document> {
        self.state().documents.get(path).cloned()
    }

    /// Documents directly inside `collection`, ordered by path.
    pub fn documents_in(&self, collection: &DocPath) -> Vec<(DocPath, Document)> {
        self.state()
            .documents
            .iter()
            .filter(|(path, _)| path.parent().as_ref() == Some(collection))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect()
    }

    /// End every live stream with an error.
    pub fn inject_stream_error(&self, message: &str) {
        let mut state = self.state();
        for sub in &state.subscribers {
            let _ = sub.tx.send(Err(CloudError::Stream(message.to_string())));
        }
        state.subscribers.clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state().fail_subscribe = fail;
    }

    /// Every query subscribed so far.
    pub fn queries(&self) -> Vec<UpdatesQuery> {
        self.state().queries.clone()
    }

    /// Subscriptions whose receiver is still alive.
    pub fn active_subscriptions(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|s| !s.tx.is_closed());
        state.subscribers.len()
    }
}

impl Default for MemoryCloudStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloudInner {
    fn apply(&mut self, path: &DocPath, document: Document, merge: bool) {
        let stored = match (merge, self.documents.remove(path)) {
            (true, Some(mut existing)) => {
                existing.extend(document);
                existing
            }
            _ => document,
        };
        self.documents.insert(path.clone(), stored.clone());
        self.notify(path, Some(&stored));
    }

    /// Push the change at `path` to every subscriber of its collection.
    fn notify(&mut self, path: &DocPath, document: Option<&Document>) {
        let Some(collection) = path.parent() else {
            return;
        };
        let doc_id = path.id().to_string();

        self.subscribers.retain_mut(|sub| {
            if sub.query.collection != collection {
                return !sub.tx.is_closed();
            }

            let was_visible = sub.visible.contains(&doc_id);
            let kind = match document {
                Some(doc) if sub.query.matches(doc) => {
                    sub.visible.insert(doc_id.clone());
                    if was_visible {
                        ChangeKind::Modified
                    } else {
                        ChangeKind::Added
                    }
                }
                _ if was_visible => {
                    sub.visible.remove(&doc_id);
                    ChangeKind::Removed
                }
                _ => return !sub.tx.is_closed(),
            };

            let change = ChangeNotification {
                kind,
                doc_id: doc_id.clone(),
                document: document.cloned().unwrap_or_default(),
            };
            sub.tx.send(Ok(vec![change])).is_ok()
        });
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    async fn subscribe(&self, query: UpdatesQuery) -> Result<Subscription> {
        let mut state = self.state();
        state.queries.push(query.clone());
        if state.fail_subscribe {
            return Err(CloudError::Unavailable("subscribe rejected".into()));
        }

        let id = state.next_subscription;
        state.next_subscription += 1;
        let (tx, subscription) = Subscription::channel(id, query.clone());

        let snapshot: Vec<ChangeNotification> = state
            .documents
            .iter()
            .filter(|(path, doc)| path.parent().as_ref() == Some(&query.collection) && query.matches(doc))
            .map(|(path, doc)| ChangeNotification {
                kind: ChangeKind::Added,
                doc_id: path.id().to_string(),
                document: doc.clone(),
            })
            .collect();

        let visible = snapshot.iter().map(|c| c.doc_id.clone()).collect();
        let _ = tx.send(Ok(snapshot));

        state.subscribers.push(Subscriber { query, tx, visible });
        tracing::debug!(subscription = id, "memory cloud subscription opened");
        Ok(subscription)
    }

    async fn write(&self, path: &DocPath, document: Document, options: WriteOptions) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(CloudError::Write {
                path: path.to_string(),
                reason: "writes disabled".into(),
            });
        }
        if !path.is_document() {
            return Err(CloudError::InvalidPath(path.to_string()));
        }
        state.apply(path, document, options.merge);
        Ok(())
    }

    async fn read(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self.state().documents.get(path).cloned())
    }
}
