//! Status the host UI shows for the sync session.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the edit push currently stands, as reported by the local runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EditsState {
    #[default]
    NoNewEdits,
    StartingSync,
    FetchingNewEdits,
    SendingData,
    UpdatesSent,
    NewEdits,
}

impl EditsState {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::NoNewEdits,
            1 => Self::StartingSync,
            2 => Self::FetchingNewEdits,
            3 => Self::SendingData,
            4 => Self::UpdatesSent,
            5 => Self::NewEdits,
            _ => return None,
        })
    }

    /// Accepts a number or a numeric string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = match value {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        u8::try_from(code).ok().and_then(Self::from_code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoNewEdits => "No New Edits",
            Self::StartingSync => "Starting Sync",
            Self::FetchingNewEdits => "Fetching New Edits",
            Self::SendingData => "Sending Data",
            Self::UpdatesSent => "Updates Sent",
            Self::NewEdits => "New Edits",
        }
    }
}

impl fmt::Display for EditsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

impl From<EditsState> for u8 {
    fn from(state: EditsState) -> u8 {
        state.code()
    }
}

impl TryFrom<u8> for EditsState {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown edits state {code}"))
    }
}

/// A pair of progress counters that reset once they meet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProgress {
    pub total: u64,
    pub completed: u64,
}

impl ContainerProgress {
    /// Add to both counters. Returns true if they met and were reset.
    pub fn record(&mut self, total: u64, completed: u64) -> bool {
        self.total += total;
        self.completed += completed;
        if self.completed > self.total {
            tracing::warn!(
                total = self.total,
                completed = self.completed,
                "container progress overflowed, resetting completed"
            );
            self.completed = 0;
        }
        if self.total == self.completed {
            *self = Self::default();
            return true;
        }
        false
    }
}

/// Session status shared with the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBoard {
    pub edits_state: EditsState,
    /// Edits the local runtime still holds back.
    pub pending_edits: u64,
    /// Container downloads announced by inbound updates.
    pub downloads: ContainerProgress,
    /// Container uploads confirmed through received edits.
    pub uploads: ContainerProgress,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the state changed.
    pub fn set_edits_state(&mut self, state: EditsState) -> bool {
        if self.edits_state == state {
            return false;
        }
        tracing::info!(from = %self.edits_state, to = %state, "edits state changed");
        self.edits_state = state;
        true
    }

    pub fn set_pending_edits(&mut self, pending: u64) {
        if self.pending_edits != pending {
            tracing::debug!(pending, "pending edits updated");
        }
        self.pending_edits = pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_codes_and_labels() {
        assert_eq!(EditsState::from_code(3), Some(EditsState::SendingData));
        assert_eq!(EditsState::from_code(6), None);
        assert_eq!(EditsState::UpdatesSent.label(), "Updates Sent");
        assert_eq!(EditsState::from_value(&json!("5")), Some(EditsState::NewEdits));
        assert_eq!(EditsState::from_value(&json!(1)), Some(EditsState::StartingSync));
        assert_eq!(EditsState::from_value(&json!(-1)), None);
        assert_eq!(EditsState::from_value(&json!(300)), None);
    }

    #[test]
    fn test_state_serializes_as_code() {
        assert_eq!(serde_json::to_value(EditsState::FetchingNewEdits).unwrap(), json!(2));
        let state: EditsState = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(state, EditsState::UpdatesSent);
        assert!(serde_json::from_value::<EditsState>(json!(9)).is_err());
    }

    #[test]
    fn test_progress_resets_when_counters_meet() {
        let mut progress = ContainerProgress::default();
        assert!(!progress.record(3, 1));
        assert!(!progress.record(0, 1));
        assert_eq!(progress, ContainerProgress { total: 3, completed: 2 });
        assert!(progress.record(0, 1));
        assert_eq!(progress, ContainerProgress::default());
    }

    #[test]
    fn test_progress_overflow_resets_completed() {
        let mut progress = ContainerProgress::default();
        assert!(!progress.record(2, 0));
        assert!(!progress.record(0, 5));
        assert_eq!(progress, ContainerProgress { total: 2, completed: 0 });
    }

    #[test]
    fn test_state_transition_reports_change() {
        let mut board = StatusBoard::new();
        assert!(board.set_edits_state(EditsState::SendingData));
        assert!(!board.set_edits_state(EditsState::SendingData));
        board.set_pending_edits(7);
        assert_eq!(board.pending_edits, 7);
    }
}
