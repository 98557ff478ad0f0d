//! Agent controller - main execution loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::action::Action;
use crate::decision::parse_decision;
use crate::event::Event;
use crate::executor::ActionExecutor;
use crate::history::{DecisionRecord, HistoryEntry};
use crate::state::{Run, RunState, MAX_ITERATIONS_MESSAGE};
use crate::stream::{EventSink, NullSink};
use crate::Error;

/// Default maximum number of iterations before forcing termination.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// Default pause between steps, letting the environment finish rendering.
pub const DEFAULT_STABILIZATION: Duration = Duration::from_millis(500);

const CANCELLED_MESSAGE: &str = "stopped by user";
const ABANDONED_MESSAGE: &str = "run abandoned while in progress";

/// A snapshot of the controlled environment, opaque to the loop.
#[derive(Clone)]
pub struct Observation {
    /// MIME type of the encoded image, e.g. `image/jpeg`.
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
            captured_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("media_type", &self.media_type)
            .field("data_len", &self.data.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Source of fresh observations.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self) -> Result<Observation, Error>;
}

/// The decision oracle: maps goal, observation and history to the raw text
/// of the next action.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        goal: &str,
        observation: &Observation,
        history: &[DecisionRecord],
    ) -> Result<String, Error>;
}

#[async_trait]
impl<T: Observer + ?Sized> Observer for Arc<T> {
    async fn observe(&self) -> Result<Observation, Error> {
        (**self).observe().await
    }
}

#[async_trait]
impl<T: DecisionOracle + ?Sized> DecisionOracle for Arc<T> {
    async fn decide(
        &self,
        goal: &str,
        observation: &Observation,
        history: &[DecisionRecord],
    ) -> Result<String, Error> {
        (**self).decide(goal, observation, history).await
    }
}

/// Loop settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_iterations: u32,
    /// Pause after each executed action.
    pub stabilization: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stabilization: DEFAULT_STABILIZATION,
        }
    }
}

enum Step {
    Continue,
    Finished(RunState),
    Cancelled,
}

/// Forces a run that is still `Running` into `Stopped` when dropped, covering
/// early returns, panics and an abandoned future.
struct Finalizer<'a>(&'a Run);

impl Drop for Finalizer<'_> {
    fn drop(&mut self) {
        if self.0.update(|status| status.stop(ABANDONED_MESSAGE)) {
            warn!("Run was still running at exit, marked stopped");
        }
    }
}

/// Drives one [`Run`] through observe -> decide -> execute -> record.
pub struct AgentController<O, D, E> {
    run: Arc<Run>,
    observer: O,
    oracle: D,
    executor: E,
    sink: Arc<dyn EventSink>,
    config: RunConfig,
}

impl<O, D, E> AgentController<O, D, E>
where
    O: Observer,
    D: DecisionOracle,
    E: ActionExecutor,
{
    pub fn new(observer: O, oracle: D, executor: E) -> Self {
        Self {
            run: Arc::new(Run::new()),
            observer,
            oracle,
            executor,
            sink: Arc::new(NullSink),
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach the consumer of this run's events.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Shared handle for reading state, result and history while running.
    pub fn run_handle(&self) -> Arc<Run> {
        self.run.clone()
    }

    /// Run the loop until a terminal state.
    ///
    /// Returns the terminal state for `done`, `failed` and cancellation. Budget
    /// exhaustion leaves the run `Failed` and returns
    /// [`Error::MaxIterations`]; observation, decision and validation errors
    /// leave it `Stopped` and are returned. A second call returns
    /// [`Error::NotIdle`] without touching the run.
    pub async fn run(
        &self,
        goal: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<RunState, Error> {
        let goal = goal.into();
        self.run.update(|status| status.start(goal.as_str()))?;

        let span = info_span!("run", run_id = %self.run.id());
        self.drive(&goal, &cancel).instrument(span).await
    }

    async fn drive(&self, goal: &str, cancel: &CancellationToken) -> Result<RunState, Error> {
        let finalizer = Finalizer(&self.run);
        info!(
            goal = %goal,
            max_iterations = self.config.max_iterations,
            "Starting run"
        );

        let outcome = self.step_loop(goal, cancel).await;
        if let Err(e) = &outcome {
            error!(error = %e, "Run ended with error");
            self.run.update(|status| status.stop(e.to_string()));
        }
        drop(finalizer);

        let state = self.run.state();
        match &outcome {
            Err(e) if state == RunState::Stopped => {
                self.sink.emit(Event::errored(self.run.id(), e.to_string()));
            }
            _ => {
                self.sink
                    .emit(Event::finished(self.run.id(), state, self.run.result()));
            }
        }

        let status = self.run.status();
        info!(
            state = %state,
            actions = status.metrics.actions,
            failed_actions = status.metrics.failed_actions,
            duration_secs = ?status.metrics.duration_secs(),
            "Run finished"
        );
        outcome
    }

    async fn step_loop(&self, goal: &str, cancel: &CancellationToken) -> Result<RunState, Error> {
        let max_iterations = self.config.max_iterations;

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Ok(self.stop_cancelled());
            }
            self.run.update(|status| status.iteration = iteration);
            debug!(iteration, "Agent iteration");

            match self.step(goal, cancel).await? {
                Step::Continue => {}
                Step::Finished(state) => return Ok(state),
                Step::Cancelled => return Ok(self.stop_cancelled()),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.stop_cancelled()),
                _ = tokio::time::sleep(self.config.stabilization) => {}
            }
        }

        warn!(max_iterations, "Iteration budget exhausted");
        self.run.update(|status| status.fail(MAX_ITERATIONS_MESSAGE));
        Err(Error::MaxIterations(max_iterations))
    }

    async fn step(&self, goal: &str, cancel: &CancellationToken) -> Result<Step, Error> {
        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Cancelled),
            observation = self.observer.observe() => observation?,
        };
        debug!(?observation, "Captured observation");

        let context = self.run.history().as_decision_context();
        self.run.update(|status| status.metrics.decisions += 1);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Step::Cancelled),
            response = self.oracle.decide(goal, &observation, &context) => response?,
        };

        let action = parse_decision(&response).inspect_err(|e| {
            warn!(error = %e, "Rejected decision");
        })?;

        match &action {
            Action::Done { summary } => {
                info!(summary = %summary, "Goal completed");
                self.run.update(|status| status.complete(summary.as_str()));
                return Ok(Step::Finished(RunState::Completed));
            }
            Action::Failed { reason } => {
                info!(reason = %reason, "Oracle reported failure");
                self.run.update(|status| status.fail(reason.as_str()));
                return Ok(Step::Finished(RunState::Failed));
            }
            _ => {}
        }

        info!(action = %action, "Executing action");
        let outcome = self.executor.execute(&action).await;
        self.run.update(|status| {
            status.metrics.actions += 1;
            if !outcome.success() {
                status.metrics.failed_actions += 1;
            }
        });

        self.run
            .history()
            .append(HistoryEntry::new(action.clone(), outcome.clone()));
        self.sink
            .emit(Event::action_executed(self.run.id(), action, outcome));

        Ok(Step::Continue)
    }

    fn stop_cancelled(&self) -> RunState {
        info!("Cancellation observed, stopping run");
        self.run.update(|status| status.stop(CANCELLED_MESSAGE));
        self.run.state()
    }
}

impl<O, D, E> AgentController<O, D, E>
where
    O: Observer + 'static,
    D: DecisionOracle + 'static,
    E: ActionExecutor + 'static,
{
    /// Run the loop on its own task. Grab [`run_handle`](Self::run_handle)
    /// first to observe progress.
    pub fn spawn(
        self,
        goal: impl Into<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<RunState, Error>> {
        let goal = goal.into();
        tokio::spawn(async move { self.run(goal, cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionOutcome;
    use crate::event::EventPayload;
    use crate::stream::{CallbackSink, EventStream};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const WAIT: &str = r#"{"type": "wait", "ms": 1}"#;

    #[derive(Default)]
    struct MockObserver {
        calls: AtomicUsize,
        cancel_on_call: Option<(usize, CancellationToken)>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl Observer for MockObserver {
        async fn observe(&self) -> Result<Observation, Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((n, token)) = &self.cancel_on_call {
                if call == *n {
                    token.cancel();
                }
            }
            if self.fail {
                return Err(Error::Observation("no active displays found".into()));
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(Observation::new("image/jpeg", "aGVsbG8="))
        }
    }

    /// Replays scripted responses, then keeps answering `wait`.
    #[derive(Default)]
    struct MockOracle {
        responses: Mutex<VecDeque<String>>,
        contexts: Mutex<Vec<Vec<DecisionRecord>>>,
        hang: bool,
    }

    impl MockOracle {
        fn scripted(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.contexts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DecisionOracle for MockOracle {
        async fn decide(
            &self,
            _goal: &str,
            _observation: &Observation,
            history: &[DecisionRecord],
        ) -> Result<String, Error> {
            self.contexts.lock().unwrap().push(history.to_vec());
            if self.hang {
                std::future::pending::<()>().await;
            }
            let next = self.responses.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| WAIT.to_string()))
        }
    }

    #[derive(Default)]
    struct MockExecutor {
        executed: Mutex<Vec<Action>>,
        fail_first: bool,
    }

    impl MockExecutor {
        fn executed(&self) -> Vec<Action> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for MockExecutor {
        async fn execute(&self, action: &Action) -> ActionOutcome {
            let mut executed = self.executed.lock().unwrap();
            executed.push(action.clone());
            if self.fail_first && executed.len() == 1 {
                ActionOutcome::failure("element not found")
            } else {
                ActionOutcome::ok()
            }
        }
    }

    fn test_config(max_iterations: u32) -> RunConfig {
        RunConfig {
            max_iterations,
            stabilization: Duration::from_millis(10),
        }
    }

    type Controller = AgentController<Arc<MockObserver>, Arc<MockOracle>, Arc<MockExecutor>>;

    fn controller(
        observer: Arc<MockObserver>,
        oracle: Arc<MockOracle>,
        executor: Arc<MockExecutor>,
        max_iterations: u32,
    ) -> Controller {
        AgentController::new(observer, oracle, executor).with_config(test_config(max_iterations))
    }

    fn collecting_sink() -> (
        CallbackSink<impl Fn(Event) + Send + Sync>,
        Arc<Mutex<Vec<Event>>>,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            CallbackSink::new(move |event: Event| events.lock().unwrap().push(event))
        };
        (sink, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_then_done() {
        let oracle = MockOracle::scripted(&[
            r#"{"type": "click", "x": 10, "y": 20}"#,
            r#"{"type": "done", "summary": "ok"}"#,
        ]);
        let executor = Arc::new(MockExecutor::default());
        let (sink, events) = collecting_sink();
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor.clone(),
            10,
        )
        .with_sink(sink);
        let run = controller.run_handle();

        let state = controller
            .run("click then stop", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state, RunState::Completed);
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.result().as_deref(), Some("ok"));
        assert_eq!(run.goal(), "click then stop");
        assert_eq!(run.history().len(), 1);

        let entry = run.history().last().unwrap();
        assert_eq!(
            entry.action,
            Action::Click {
                x: 10,
                y: 20,
                button: "left".into(),
                double: false,
            }
        );
        assert!(entry.outcome.success());
        assert_eq!(executor.executed(), vec![entry.action.clone()]);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].payload,
            EventPayload::ActionExecuted { .. }
        ));
        assert!(matches!(
            &events[1].payload,
            EventPayload::Finished { state: RunState::Completed, result } if result == "ok"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_decision_stops_loop() {
        let oracle = MockOracle::scripted(&[r#"{"type": "failed", "reason": "no window"}"#]);
        let executor = Arc::new(MockExecutor::default());
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor.clone(),
            10,
        );
        let run = controller.run_handle();

        let state = controller.run("goal", CancellationToken::new()).await.unwrap();

        assert_eq!(state, RunState::Failed);
        assert_eq!(run.result().as_deref(), Some("no window"));
        assert_eq!(oracle.calls(), 1);
        assert!(executor.executed().is_empty());
        assert!(run.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion() {
        let oracle = MockOracle::scripted(&[]);
        let executor = Arc::new(MockExecutor::default());
        let (sink, events) = collecting_sink();
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor.clone(),
            2,
        )
        .with_sink(sink);
        let run = controller.run_handle();

        let err = controller
            .run("never ends", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MaxIterations(2)));
        assert_eq!(err.to_string(), "max iterations (2) reached");
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(run.result().as_deref(), Some(MAX_ITERATIONS_MESSAGE));
        assert_eq!(run.history().len(), 2);
        assert_eq!(executor.executed().len(), 2);
        assert_eq!(run.status().metrics.actions, 2);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2].payload,
            EventPayload::Finished {
                state: RunState::Failed,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let oracle = MockOracle::scripted(&[r#"{"type": "done"}"#]);
        let (sink, events) = collecting_sink();
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            Arc::new(MockExecutor::default()),
            10,
        )
        .with_sink(sink);
        let run = controller.run_handle();

        controller.run("first", CancellationToken::new()).await.unwrap();
        let err = controller
            .run("second", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotIdle(RunState::Completed)));
        assert_eq!(run.state(), RunState::Completed);
        assert_eq!(run.goal(), "first");
        assert_eq!(oracle.calls(), 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_nth_observation() {
        let cancel = CancellationToken::new();
        let observer = Arc::new(MockObserver {
            cancel_on_call: Some((3, cancel.clone())),
            ..Default::default()
        });
        let executor = Arc::new(MockExecutor::default());
        let (sink, events) = collecting_sink();
        let controller = controller(
            observer.clone(),
            MockOracle::scripted(&[]),
            executor.clone(),
            10,
        )
        .with_sink(sink);
        let run = controller.run_handle();

        let state = controller.run("goal", cancel).await.unwrap();

        assert_eq!(state, RunState::Stopped);
        assert_eq!(run.state(), RunState::Stopped);
        assert_eq!(executor.executed().len(), 2);
        assert_eq!(run.history().len(), 2);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 3);

        let events = events.lock().unwrap();
        assert!(matches!(
            events.last().unwrap().payload,
            EventPayload::Finished {
                state: RunState::Stopped,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let observer = Arc::new(MockObserver::default());
        let controller = controller(
            observer.clone(),
            MockOracle::scripted(&[]),
            Arc::new(MockExecutor::default()),
            10,
        );

        let state = controller.run("goal", cancel).await.unwrap();

        assert_eq!(state, RunState::Stopped);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_observation() {
        let observer = Arc::new(MockObserver {
            hang: true,
            ..Default::default()
        });
        let controller = controller(
            observer,
            MockOracle::scripted(&[]),
            Arc::new(MockExecutor::default()),
            10,
        );
        let run = controller.run_handle();
        let cancel = CancellationToken::new();

        let handle = controller.spawn("goal", cancel.clone());
        while run.state() != RunState::Running {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let state = handle.await.unwrap().unwrap();
        assert_eq!(state, RunState::Stopped);
        assert_eq!(run.result().as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_decision() {
        let oracle = Arc::new(MockOracle {
            hang: true,
            ..Default::default()
        });
        let executor = Arc::new(MockExecutor::default());
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor.clone(),
            10,
        );
        let run = controller.run_handle();
        let cancel = CancellationToken::new();

        let handle = controller.spawn("goal", cancel.clone());
        while oracle.calls() == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let state = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(state, RunState::Stopped);
        assert_eq!(run.result().as_deref(), Some(CANCELLED_MESSAGE));
        assert!(run.history().is_empty());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stabilization() {
        let oracle = MockOracle::scripted(&[r#"{"type": "key", "key": "enter"}"#]);
        let executor = Arc::new(MockExecutor::default());
        let controller = AgentController::new(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor.clone(),
        )
        .with_config(RunConfig {
            max_iterations: 10,
            stabilization: Duration::from_secs(3600),
        });
        let run = controller.run_handle();
        let cancel = CancellationToken::new();

        let handle = controller.spawn("goal", cancel.clone());
        while run.history().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let state = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(state, RunState::Stopped);
        assert_eq!(run.history().len(), 1);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observation_error_aborts() {
        let observer = Arc::new(MockObserver {
            fail: true,
            ..Default::default()
        });
        let oracle = MockOracle::scripted(&[]);
        let (sink, events) = collecting_sink();
        let controller = controller(
            observer,
            oracle.clone(),
            Arc::new(MockExecutor::default()),
            10,
        )
        .with_sink(sink);
        let run = controller.run_handle();

        let err = controller
            .run("goal", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Observation(_)));
        assert_eq!(run.state(), RunState::Stopped);
        assert!(run.result().unwrap().contains("no active displays found"));
        assert_eq!(oracle.calls(), 0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::Errored { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_decision_never_executes() {
        let oracle = MockOracle::scripted(&[r#"{"type": "type"}"#]);
        let executor = Arc::new(MockExecutor::default());
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle,
            executor.clone(),
            10,
        );
        let run = controller.run_handle();

        let err = controller
            .run("goal", CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ref e) if e.field == "text"));
        assert!(executor.executed().is_empty());
        assert!(run.history().is_empty());
        assert_eq!(run.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_fed_back() {
        let oracle = MockOracle::scripted(&[
            r#"{"type": "click", "x": 1, "y": 2, "button": "right"}"#,
            r#"{"type": "key", "key": "enter"}"#,
            r#"{"type": "done", "summary": "recovered"}"#,
        ]);
        let executor = Arc::new(MockExecutor {
            fail_first: true,
            ..Default::default()
        });
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle.clone(),
            executor,
            10,
        );
        let run = controller.run_handle();

        let state = controller.run("goal", CancellationToken::new()).await.unwrap();
        assert_eq!(state, RunState::Completed);

        let history = run.history().all();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome.error(), Some("element not found"));
        assert!(history[1].outcome.success());
        assert_eq!(run.status().metrics.failed_actions, 1);

        let contexts = oracle.contexts.lock().unwrap();
        assert!(contexts[0].is_empty());
        assert_eq!(
            contexts[1][0].to_string(),
            "1. click: right at (1, 2) [ERROR: element not found]"
        );
        assert_eq!(contexts[2].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_run_streams_events() {
        let oracle = MockOracle::scripted(&[
            r#"{"type": "scroll", "direction": "down"}"#,
            r#"{"type": "done", "summary": "scrolled"}"#,
        ]);
        let (stream, mut rx) = EventStream::channel(16);
        let controller = controller(
            Arc::new(MockObserver::default()),
            oracle,
            Arc::new(MockExecutor::default()),
            10,
        )
        .with_sink(stream);
        let run = controller.run_handle();

        let handle = controller.spawn("scroll", CancellationToken::new());

        let first = rx.recv().await.unwrap();
        match first.payload {
            EventPayload::ActionExecuted { action, outcome } => {
                assert_eq!(
                    action,
                    Action::Scroll {
                        direction: "down".into(),
                        amount: 3
                    }
                );
                assert!(outcome.success());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let last = rx.recv().await.unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.run_id, run.id());

        assert_eq!(handle.await.unwrap().unwrap(), RunState::Completed);
        assert_eq!(run.result().as_deref(), Some("scrolled"));
    }
}
