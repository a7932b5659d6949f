//! The FIFO shared by both pipelines.
//!
//! Items leave the head only after the batch carrying them was acknowledged.
//! The draining flag lives under the same lock as the items, so a drain that
//! finds the queue empty and an `enqueue` that finds no drain running cannot
//! both miss each other. A drain keeps the flag through its wrap-up work and
//! gives it up with [`SyncQueue::release_drain`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use fieldsync_core::Timestamp;

/// What a dispatcher receives for one batch.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a, T> {
    pub updates: &'a [T],
    /// Items still queued behind this batch.
    pub remaining: usize,
}

/// Counters and flags of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub total: u64,
    pub completed: u64,
    pub draining: bool,
}

/// Outcome of one drain loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Another drain was already running; nothing was done.
    pub skipped: bool,
    pub batches_sent: usize,
    pub items_sent: usize,
    /// Items left in the queue when the loop exited.
    pub remaining: usize,
    /// Why the loop stopped early.
    pub error: Option<String>,
    /// The new watermark or last-synced-out marker, if it moved.
    pub advanced_to: Option<Timestamp>,
}

impl DrainReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    total: u64,
    completed: u64,
    draining: bool,
}

/// A FIFO with submit/complete counters and a per-queue draining flag.
pub struct SyncQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T: Clone> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                total: 0,
                completed: 0,
                draining: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append items at the tail. Returns how many were added.
    pub fn push(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut state = self.state();
        let before = state.items.len();
        state.items.extend(items);
        let added = state.items.len() - before;
        state.total += added as u64;
        added
    }

    /// Claim the draining flag. False if a drain is already running.
    pub fn try_begin_drain(&self) -> bool {
        let mut state = self.state();
        if state.draining {
            return false;
        }
        state.draining = true;
        true
    }

    /// Give up the draining flag.
    ///
    /// Unless `force` is set, the flag is kept and false returned when items
    /// arrived since the last batch; the caller then drains them too.
    /// `on_release` runs under the queue lock, before any other drain can
    /// claim the flag.
    pub fn release_drain(&self, force: bool, on_release: impl FnOnce()) -> bool {
        let mut state = self.state();
        if !force && !state.items.is_empty() {
            return false;
        }
        state.draining = false;
        on_release();
        true
    }

    /// Copy of the first `size` items and the count queued behind them.
    pub fn next_batch(&self, size: usize) -> Option<(Vec<T>, usize)> {
        let state = self.state();
        if state.items.is_empty() {
            return None;
        }
        let take = size.max(1).min(state.items.len());
        let batch: Vec<T> = state.items.iter().take(take).cloned().collect();
        Some((batch, state.items.len() - take))
    }

    /// Remove `count` acknowledged items from the head.
    pub fn complete(&self, count: usize) {
        let mut state = self.state();
        let count = count.min(state.items.len());
        state.items.drain(..count);
        state.completed += count as u64;
    }

    /// Zero both counters when every submitted item has completed.
    pub fn reset_counters_if_complete(&self) -> bool {
        let mut state = self.state();
        if state.total != state.completed {
            return false;
        }
        state.total = 0;
        state.completed = 0;
        true
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.state().draining
    }

    /// Items in delivery order.
    pub fn snapshot(&self) -> Vec<T> {
        self.state().items.iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state();
        QueueStats {
            queued: state.items.len(),
            total: state.total,
            completed: state.completed,
            draining: state.draining,
        }
    }
}

impl<T: Clone> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
