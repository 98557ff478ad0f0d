//! Run state management.

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::history::History;
use crate::Error;

/// Result recorded when the iteration budget runs out.
pub const MAX_ITERATIONS_MESSAGE: &str = "max iterations reached";

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not started yet.
    #[default]
    Idle,
    /// The step loop is active.
    Running,
    /// The oracle declared the goal achieved.
    Completed,
    /// The oracle gave up, or the iteration budget ran out.
    Failed,
    /// Cancelled, or aborted by an unrecovered step error.
    Stopped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Stopped
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Metrics for a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of decisions requested from the oracle.
    pub decisions: u32,
    /// Number of non-terminal actions executed.
    pub actions: u32,
    /// Number of executed actions whose outcome was a failure.
    pub failed_actions: u32,
}

impl RunMetrics {
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Mutable part of a run, guarded by the run's lock.
///
/// Transition methods return `false` and change nothing when the current
/// state does not allow the transition; terminal states are never left.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub goal: String,
    /// Summary, failure reason or stop reason once terminal.
    pub result: Option<String>,
    /// Iteration currently executing, starting at 1.
    pub iteration: u32,
    pub metrics: RunMetrics,
}

impl RunStatus {
    /// `Idle -> Running`.
    pub fn start(&mut self, goal: impl Into<String>) -> Result<(), Error> {
        if self.state != RunState::Idle {
            return Err(Error::NotIdle(self.state));
        }
        self.state = RunState::Running;
        self.goal = goal.into();
        self.metrics.start();
        Ok(())
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self, summary: impl Into<String>) -> bool {
        self.finish(RunState::Completed, summary.into())
    }

    /// `Running -> Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.finish(RunState::Failed, reason.into())
    }

    /// `Running -> Stopped`.
    pub fn stop(&mut self, reason: impl Into<String>) -> bool {
        self.finish(RunState::Stopped, reason.into())
    }

    fn finish(&mut self, state: RunState, result: String) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        self.state = state;
        self.result = Some(result);
        self.metrics.finish();
        true
    }
}

/// One execution of the loop from a goal to a terminal state.
///
/// Shared behind an `Arc` between the task driving it and any number of
/// readers. Accessors hold the lock only long enough to copy a field.
#[derive(Debug, Default)]
pub struct Run {
    id: RunId,
    status: RwLock<RunStatus>,
    history: History,
}

impl Run {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.status.read().state
    }

    pub fn goal(&self) -> String {
        self.status.read().goal.clone()
    }

    pub fn result(&self) -> Option<String> {
        self.status.read().result.clone()
    }

    pub fn iteration(&self) -> u32 {
        self.status.read().iteration
    }

    /// Snapshot of state, goal, result, iteration and metrics.
    pub fn status(&self) -> RunStatus {
        self.status.read().clone()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut RunStatus) -> T) -> T {
        f(&mut self.status.write())
    }
}
