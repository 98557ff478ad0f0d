//! Core perceive-decide-act loop and types for the desktop automation agent.

pub mod action;
pub mod controller;
pub mod decision;
pub mod event;
pub mod executor;
pub mod history;
pub mod state;
pub mod stream;

pub use action::{Action, ActionKind, ActionOutcome, RawAction, ValidationError};
pub use controller::{AgentController, DecisionOracle, Observation, Observer, RunConfig};
pub use decision::parse_decision;
pub use event::{Event, EventPayload};
pub use executor::{ActionExecutor, EffectError, Executor, ExecutorConfig, InputDevice};
pub use history::{DecisionRecord, History, HistoryEntry};
pub use state::{Run, RunId, RunMetrics, RunState, RunStatus, MAX_ITERATIONS_MESSAGE};
pub use stream::{CallbackSink, EventSink, EventStream, NullSink};

pub use tokio_util::sync::CancellationToken;

/// Error types for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid action: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to capture observation: {0}")]
    Observation(String),

    #[error("failed to get action from oracle: {0}")]
    Decision(String),

    #[error("max iterations ({0}) reached")]
    MaxIterations(u32),

    #[error("agent is not idle (current state: {0})")]
    NotIdle(RunState),
}
