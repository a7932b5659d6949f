//! Batch-group tracking for inbound updates.
//!
//! A producer may split one logical change into several updates that share a
//! batch-group id and declare the group's size. The watermark may only move
//! past such a change once every member has been delivered, so the tracker
//! holds per-group progress and hands out a watermark candidate exactly when
//! a group completes.
//!
//! Groups live only in memory. A restart re-delivers anything past the
//! persisted watermark, which rebuilds the groups from scratch.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::document::MinimalUpdate;
use crate::types::{BatchGroup, BatchGroupId, Timestamp};

/// Result of observing one delivered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The item completed its group (or had none).
    Completed {
        group: Option<BatchGroupId>,
        candidate: Timestamp,
    },
    /// The item's group is still missing members.
    Pending {
        group: BatchGroupId,
        received: u32,
        expected: u32,
    },
}

impl Observation {
    /// The watermark candidate, if the observation completed a group.
    pub fn candidate(&self) -> Option<Timestamp> {
        match self {
            Observation::Completed { candidate, .. } => Some(*candidate),
            Observation::Pending { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Observation::Completed { .. })
    }
}

#[derive(Debug, Clone)]
struct GroupProgress {
    earliest: Timestamp,
    latest: Timestamp,
    members: HashSet<String>,
    expected: u32,
    last_seen: Timestamp,
}

/// Tracks partially delivered batch groups.
#[derive(Debug, Default)]
pub struct BatchTracker {
    groups: HashMap<BatchGroupId, GroupProgress>,
    staleness: Option<Duration>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force-complete groups that have not seen a member for `staleness`.
    ///
    /// Off by default: a producer that declares a wrong size stalls the
    /// watermark until the group is completed or this bound is set.
    pub fn with_staleness(mut self, staleness: Option<Duration>) -> Self {
        self.staleness = staleness;
        self
    }

    /// Observe one delivered item.
    ///
    /// `member` identifies the item inside its group; re-delivering the same
    /// member does not count twice.
    pub fn observe(
        &mut self,
        group: Option<&BatchGroup>,
        member: &str,
        timestamp: Timestamp,
        now: Timestamp,
    ) -> Observation {
        let Some(group) = group else {
            return Observation::Completed {
                group: None,
                candidate: timestamp,
            };
        };

        let expected = group.expected();
        let progress = self
            .groups
            .entry(group.id.clone())
            .or_insert_with(|| GroupProgress {
                earliest: timestamp,
                latest: timestamp,
                members: HashSet::new(),
                expected,
                last_seen: now,
            });

        progress.earliest = progress.earliest.min(timestamp);
        progress.latest = progress.latest.max(timestamp);
        progress.expected = expected;
        progress.last_seen = now;
        progress.members.insert(member.to_string());

        let received = progress.members.len() as u32;
        if received >= expected {
            let candidate = progress.latest;
            self.groups.remove(&group.id);
            Observation::Completed {
                group: Some(group.id.clone()),
                candidate,
            }
        } else {
            Observation::Pending {
                group: group.id.clone(),
                received,
                expected,
            }
        }
    }

    /// Observe a delivered inbound update.
    pub fn observe_update(&mut self, update: &MinimalUpdate, now: Timestamp) -> Observation {
        let group = update.batch_group();
        self.observe(group.as_ref(), &update.member_key(), update.timestamp, now)
    }

    /// The newest timestamp seen so far for a group still in progress.
    pub fn candidate(&self, id: &BatchGroupId) -> Option<Timestamp> {
        self.groups.get(id).map(|p| p.latest)
    }

    /// `(received, expected)` for a group still in progress.
    pub fn progress(&self, id: &BatchGroupId) -> Option<(u32, u32)> {
        self.groups
            .get(id)
            .map(|p| (p.members.len() as u32, p.expected))
    }

    /// The oldest timestamp seen in any incomplete group.
    ///
    /// The watermark must stay below this while such a group is open.
    pub fn floor(&self) -> Option<Timestamp> {
        self.groups.values().map(|p| p.earliest).min()
    }

    /// Number of groups still waiting for members.
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// Remove groups idle for longer than the staleness bound, returning
    /// their candidates. A no-op unless a bound was configured.
    pub fn expire_stale(&mut self, now: Timestamp) -> Vec<(BatchGroupId, Timestamp)> {
        let Some(staleness) = self.staleness else {
            return Vec::new();
        };

        let stale: Vec<BatchGroupId> = self
            .groups
            .iter()
            .filter(|(_, p)| now.saturating_since(p.last_seen) > staleness)
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(progress) = self.groups.remove(&id) {
                tracing::warn!(
                    group = %id,
                    received = progress.members.len(),
                    expected = progress.expected,
                    "force-completing stale batch group"
                );
                expired.push((id, progress.latest));
            }
        }
        expired.sort();
        expired
    }

    /// Drop all in-progress groups.
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
