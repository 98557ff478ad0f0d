//! Append-only log of executed actions.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::action::{preview, Action, ActionKind, ActionOutcome};

/// Characters of an error message kept in the decision context.
const ERROR_PREVIEW_CHARS: usize = 200;

/// A timestamped action together with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub outcome: ActionOutcome,
}

impl HistoryEntry {
    pub fn new(action: Action, outcome: ActionOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            outcome,
        }
    }
}

/// One line of history as shown to the decision oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRecord {
    /// 1-based position in the history.
    pub step: usize,
    pub kind: ActionKind,
    /// Normalized parameters, previews only.
    pub detail: String,
    /// Error message when the action failed.
    pub error: Option<String>,
}

impl DecisionRecord {
    fn from_entry(step: usize, entry: &HistoryEntry) -> Self {
        Self {
            step,
            kind: entry.action.kind(),
            detail: entry.action.detail(),
            error: entry
                .outcome
                .error()
                .filter(|_| !entry.outcome.success())
                .map(|e| preview(e, ERROR_PREVIEW_CHARS)),
        }
    }
}

impl fmt::Display for DecisionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}: {} ", self.step, self.kind, self.detail)?;
        match &self.error {
            Some(error) => write!(f, "[ERROR: {error}]"),
            None => f.write_str("[OK]"),
        }
    }
}

/// Shared, append-only history.
///
/// Clones share the same log. Only the step loop appends; readers get
/// snapshots, so they never observe a half-written entry or hold the lock
/// while iterating.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, entry: HistoryEntry) {
        self.entries.write().push(entry);
    }

    /// Prior actions and outcomes in execution order, rendered for the oracle.
    pub fn as_decision_context(&self) -> Vec<DecisionRecord> {
        self.entries
            .read()
            .iter()
            .enumerate()
            .map(|(i, entry)| DecisionRecord::from_entry(i + 1, entry))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn last(&self) -> Option<HistoryEntry> {
        self.entries.read().last().cloned()
    }

    /// Snapshot of every entry.
    pub fn all(&self) -> Vec<HistoryEntry> {
        self.entries.read().clone()
    }
}
