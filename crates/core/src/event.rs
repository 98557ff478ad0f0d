//! Events emitted by a run.
//!
//! Exactly three kinds reach the outside world:
//! - an action was executed (action + outcome), once per step;
//! - the run finished (terminal state + result), at most once;
//! - the run errored (message), at most once, instead of finishing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::{Action, ActionOutcome};
use crate::state::{RunId, RunState};

/// A timestamped event from a run.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(run_id: RunId, payload: EventPayload) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn action_executed(run_id: RunId, action: Action, outcome: ActionOutcome) -> Self {
        Self::new(run_id, EventPayload::ActionExecuted { action, outcome })
    }

    pub fn finished(run_id: RunId, state: RunState, result: Option<String>) -> Self {
        Self::new(
            run_id,
            EventPayload::Finished {
                state,
                result: result.unwrap_or_default(),
            },
        )
    }

    pub fn errored(run_id: RunId, message: impl Into<String>) -> Self {
        Self::new(
            run_id,
            EventPayload::Errored {
                message: message.into(),
            },
        )
    }

    /// Whether this is the last event of its run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.payload, EventPayload::ActionExecuted { .. })
    }
}

/// The payload of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A non-terminal action went through the executor.
    ActionExecuted {
        action: Action,
        outcome: ActionOutcome,
    },

    /// The run reached a terminal state.
    Finished { state: RunState, result: String },

    /// The run was aborted by an error.
    Errored { message: String },
}
