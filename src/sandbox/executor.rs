//! Snippet executor.
//!
//! Every execution gets its own named OS thread, a fresh
//! [`SandboxEnvironment`] built on that thread and exclusive use of the
//! shared framebuffer. The async caller waits for the worker's report under
//! the wall-clock deadline; on expiry it trips the worker's interrupt handle
//! and joins the thread within the grace period.
//!
//! ```text
//! Idle ─▶ Preparing ─▶ Running ─┬─▶ Completed ─┐
//!                               ├─▶ TimedOut  ─┼─▶ TornDown
//!                               └─▶ Faulted   ─┘
//! ```
//!
//! TornDown is reached on every path, including early returns and panics,
//! because it is performed by a drop guard that owns the render lock.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::{Notify, OwnedMutexGuard, oneshot};
use uuid::Uuid;

use super::environment::SandboxEnvironment;
use super::error::SandboxError;
use super::limits::{InterruptHandle, ResourceLimits};
use crate::config::VizConfig;
use crate::error::{PipelineError, RenderError, SnippetIssue};
use crate::extract::Snippet;
use crate::render::{self, Figure, Framebuffer, RenderBackend, RenderLimits};
use crate::script::{Interpreter, Meter, ScriptError, parse_program};

/// Worker stack size. Deeply nested snippet expressions recurse in the
/// parser and interpreter.
const WORKER_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxState {
    Idle,
    Preparing,
    Running,
    Completed,
    TimedOut,
    Faulted,
    TornDown,
}

impl SandboxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Faulted)
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Faulted => "faulted",
            Self::TornDown => "torn_down",
        };
        f.write_str(name)
    }
}

/// Ordered record of the states one execution passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionTrace {
    states: Vec<SandboxState>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self {
            states: vec![SandboxState::Idle],
        }
    }

    pub fn record(&mut self, state: SandboxState) {
        tracing::trace!(state = %state, "Sandbox state change");
        self.states.push(state);
    }

    pub fn states(&self) -> &[SandboxState] {
        &self.states
    }

    pub fn last(&self) -> Option<SandboxState> {
        self.states.last().copied()
    }

    pub fn reached(&self, state: SandboxState) -> bool {
        self.states.contains(&state)
    }
}

/// How an execution ended, as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Ran to completion and drew something.
    Completed,
    /// Ran to completion without drawing anything.
    Empty,
    /// Interrupted at the deadline.
    TimedOut,
    /// Raised, failed to parse, exhausted a limit or failed to render.
    Faulted,
}

/// Result of one snippet execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Correlates this execution's log lines.
    pub execution_id: Uuid,
    pub snippet_ordinal: usize,
    pub succeeded: bool,
    /// PNG bytes, present only on success.
    pub raster_bytes: Option<Vec<u8>>,
    /// `Kind: message`, present on timeout or fault.
    pub error_summary: Option<String>,
    pub duration_ms: u64,
    pub outcome: ExecutionOutcome,
    pub trace: ExecutionTrace,
    /// Interpreter steps taken; zero when the worker never reported.
    pub steps: u64,
    pub deadline: Duration,
}

impl ExecutionResult {
    /// The issue to report when this execution produced no raster.
    pub fn issue(&self) -> Option<SnippetIssue> {
        match self.outcome {
            ExecutionOutcome::Completed => None,
            ExecutionOutcome::Empty => Some(SnippetIssue::RenderEmpty),
            ExecutionOutcome::TimedOut => Some(SnippetIssue::SandboxTimeout {
                deadline: self.deadline,
            }),
            ExecutionOutcome::Faulted => Some(SnippetIssue::SandboxFault {
                summary: self.error_summary.clone().unwrap_or_default(),
            }),
        }
    }
}

/// What a worker thread sends back.
struct WorkerReport {
    result: Result<Figure, ScriptError>,
    steps: u64,
}

/// Keeps the live-worker count accurate however the worker exits.
struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds the render lock for the life of an execution and tears down on drop.
struct Session {
    surface: Option<OwnedMutexGuard<Framebuffer>>,
    trace: ExecutionTrace,
    torn_down: bool,
}

impl Session {
    fn open(surface: OwnedMutexGuard<Framebuffer>) -> Self {
        let mut trace = ExecutionTrace::new();
        trace.record(SandboxState::Preparing);
        Self {
            surface: Some(surface),
            trace,
            torn_down: false,
        }
    }

    fn finish(mut self) -> ExecutionTrace {
        self.teardown();
        std::mem::take(&mut self.trace)
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if let Some(mut surface) = self.surface.take() {
            surface.clear();
        }
        self.torn_down = true;
        self.trace.record(SandboxState::TornDown);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Removes an execution from the in-flight registry when it ends.
struct InFlight<'a> {
    executor: &'a SandboxExecutor,
    id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.executor.registry().remove(&self.id);
        self.executor.idle.notify_waiters();
    }
}

/// Runs snippets in isolated workers under a deadline.
pub struct SandboxExecutor {
    limits: ResourceLimits,
    render_limits: RenderLimits,
    backend: Arc<RenderBackend>,
    live_workers: Arc<AtomicUsize>,
    in_flight: Mutex<HashMap<Uuid, InterruptHandle>>,
    idle: Notify,
    shutting_down: AtomicBool,
}

impl SandboxExecutor {
    /// Create an executor that renders through the process-wide backend.
    pub fn new(config: &VizConfig) -> Self {
        Self::with_backend(config, RenderBackend::shared())
    }

    pub fn with_backend(config: &VizConfig, backend: Arc<RenderBackend>) -> Self {
        Self {
            limits: ResourceLimits::from_config(config),
            render_limits: RenderLimits::from_config(config),
            backend,
            live_workers: Arc::new(AtomicUsize::new(0)),
            in_flight: Mutex::new(HashMap::new()),
            idle: Notify::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Number of executions currently between acquire and teardown.
    pub fn in_flight_count(&self) -> usize {
        self.registry().len()
    }

    /// Number of worker threads that have not yet exited.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, InterruptHandle>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, interrupt: &InterruptHandle) -> InFlight<'_> {
        let id = Uuid::new_v4();
        self.registry().insert(id, interrupt.clone());
        InFlight { executor: self, id }
    }

    /// Execute one extracted snippet.
    pub async fn execute(&self, snippet: &Snippet) -> Result<ExecutionResult, PipelineError> {
        self.execute_source(snippet.ordinal, &snippet.source).await
    }

    /// Execute snippet source.
    ///
    /// Snippet failures are reported in the returned [`ExecutionResult`];
    /// `Err` means the executor itself could not do its job.
    pub async fn execute_source(
        &self,
        ordinal: usize,
        source: &str,
    ) -> Result<ExecutionResult, PipelineError> {
        if self.is_shutting_down() {
            return Err(PipelineError::ShuttingDown);
        }

        let interrupt = InterruptHandle::new();
        let in_flight = self.register(&interrupt);
        let execution_id = in_flight.id;

        let mut session = Session::open(self.backend.acquire().await);
        if self.is_shutting_down() {
            return Err(PipelineError::ShuttingDown);
        }

        let started_at = Instant::now();
        tracing::debug!(snippet = ordinal, %execution_id, "Executing visualization snippet");

        let started = Arc::new(AtomicBool::new(false));
        let (handle, report) = self.spawn_worker(ordinal, source, &interrupt, &started)?;

        let report = match tokio::time::timeout(self.limits.timeout, report).await {
            Ok(Ok(Ok(report))) => Ok(report),
            Ok(Ok(Err(message))) => {
                tracing::error!(snippet = ordinal, panic = %message, "Sandbox worker panicked");
                Err(SandboxError::WorkerLost)
            }
            Ok(Err(_)) => Err(SandboxError::WorkerLost),
            Err(_) => {
                interrupt.trip();
                Err(SandboxError::Timeout(self.limits.timeout))
            }
        };
        self.join_worker(ordinal, handle).await;

        if started.load(Ordering::SeqCst) {
            session.trace.record(SandboxState::Running);
        }

        let steps = report.as_ref().map(|r| r.steps).unwrap_or(0);
        let captured = match report.and_then(|r| r.result.map_err(SandboxError::from)) {
            Ok(figure) => self.capture(&mut session, figure).await,
            Err(err) => Err(err),
        };

        let (outcome, raster_bytes, error_summary) = match captured {
            Ok(Some(png)) => (ExecutionOutcome::Completed, Some(png), None),
            Ok(None) => (ExecutionOutcome::Empty, None, None),
            Err(err @ SandboxError::Timeout(_)) => (ExecutionOutcome::TimedOut, None, Some(err.summary())),
            Err(err) => (ExecutionOutcome::Faulted, None, Some(err.summary())),
        };
        session.trace.record(match outcome {
            ExecutionOutcome::Completed | ExecutionOutcome::Empty => SandboxState::Completed,
            ExecutionOutcome::TimedOut => SandboxState::TimedOut,
            ExecutionOutcome::Faulted => SandboxState::Faulted,
        });
        let trace = session.finish();

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        tracing::debug!(
            snippet = ordinal,
            %execution_id,
            elapsed_ms,
            steps,
            outcome = ?outcome,
            error = error_summary.as_deref().unwrap_or(""),
            "Snippet execution finished"
        );

        Ok(ExecutionResult {
            execution_id,
            snippet_ordinal: ordinal,
            succeeded: raster_bytes.is_some(),
            raster_bytes,
            error_summary,
            duration_ms: elapsed_ms,
            outcome,
            trace,
            steps,
            deadline: self.limits.timeout,
        })
    }

    fn spawn_worker(
        &self,
        ordinal: usize,
        source: &str,
        interrupt: &InterruptHandle,
        started: &Arc<AtomicBool>,
    ) -> Result<(JoinHandle<()>, oneshot::Receiver<Result<WorkerReport, String>>), PipelineError> {
        let (tx, rx) = oneshot::channel();
        let source = source.to_string();
        let limits = self.limits.clone();
        let interrupt = interrupt.clone();
        let started = Arc::clone(started);
        let live = LiveWorker::enter(&self.live_workers);

        let handle = std::thread::Builder::new()
            .name(format!("vizbox-snippet-{}", ordinal))
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let _live = live;
                let report = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    run_snippet(&source, &limits, interrupt, &started)
                }))
                .map_err(panic_message);
                // The caller may have stopped listening after a timeout.
                let _ = tx.send(report);
            })
            .map_err(|e| PipelineError::WorkerSpawn {
                reason: e.to_string(),
            })?;

        Ok((handle, rx))
    }

    async fn join_worker(&self, ordinal: usize, handle: JoinHandle<()>) {
        let join = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout(self.limits.grace, join).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(
                    snippet = ordinal,
                    grace_ms = self.limits.grace.as_millis() as u64,
                    "Sandbox worker did not stop within the grace period"
                );
            }
        }
    }

    async fn capture(
        &self,
        session: &mut Session,
        figure: Figure,
    ) -> Result<Option<Vec<u8>>, SandboxError> {
        let Some(mut surface) = session.surface.take() else {
            return Err(SandboxError::WorkerLost);
        };
        let limits = self.render_limits;
        let (surface, captured) = tokio::task::spawn_blocking(move || {
            let captured = render::capture(&figure, &mut surface, &limits);
            (surface, captured)
        })
        .await
        .map_err(|e| RenderError::Draw(format!("render task failed: {}", e)))?;
        session.surface = Some(surface);
        Ok(captured?)
    }

    /// Stop accepting work, give in-flight executions `grace` to finish and
    /// interrupt whatever is still running.
    pub async fn shutdown(&self, grace: Duration) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(in_flight = self.in_flight_count(), "Sandbox executor shutting down");

        if tokio::time::timeout(grace, self.wait_idle()).await.is_ok() {
            return;
        }

        let handles: Vec<InterruptHandle> = self.registry().values().cloned().collect();
        tracing::warn!(count = handles.len(), "Interrupting in-flight snippets");
        for handle in &handles {
            handle.trip();
        }
        if tokio::time::timeout(self.limits.grace, self.wait_idle()).await.is_err() {
            tracing::warn!(
                in_flight = self.in_flight_count(),
                "In-flight snippets did not stop after interruption"
            );
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("limits", &self.limits)
            .field("render_limits", &self.render_limits)
            .field("live_workers", &self.live_workers())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

/// Parse and interpret on the worker thread.
///
/// The environment is built here and dropped here; only the figure leaves.
fn run_snippet(
    source: &str,
    limits: &ResourceLimits,
    interrupt: InterruptHandle,
    started: &AtomicBool,
) -> WorkerReport {
    let program = match parse_program(source) {
        Ok(program) => program,
        Err(err) => {
            return WorkerReport {
                result: Err(err),
                steps: 0,
            };
        }
    };

    let mut env = SandboxEnvironment::new();
    started.store(true, Ordering::SeqCst);

    let mut interpreter = Interpreter::new(&mut env, Meter::new(limits, interrupt));
    let run = interpreter.run(&program);
    let steps = interpreter.steps_used();
    drop(interpreter);

    WorkerReport {
        result: run.map(|()| env.take_figure()),
        steps,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn executor() -> SandboxExecutor {
        SandboxExecutor::with_backend(&VizConfig::for_testing(), Arc::new(RenderBackend::new()))
    }

    fn executor_with_timeout(timeout_ms: u64) -> SandboxExecutor {
        let config = VizConfig {
            execution_timeout_ms: timeout_ms,
            ..VizConfig::for_testing()
        };
        SandboxExecutor::with_backend(&config, Arc::new(RenderBackend::new()))
    }

    #[tokio::test]
    async fn test_successful_execution_produces_png() {
        let executor = executor();
        let result = executor
            .execute_source(0, "plt.bar(['Jan', 'Feb', 'Mar'], [50, 60, 70])\nplt.title('Sales')")
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.outcome, ExecutionOutcome::Completed);
        assert!(result.error_summary.is_none());
        let png = result.raster_bytes.as_ref().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert!(result.issue().is_none());
        assert!(result.steps > 0);
    }

    #[tokio::test]
    async fn test_trace_follows_lifecycle() {
        let executor = executor();
        let result = executor.execute_source(0, "plot([1, 2, 3])").await.unwrap();
        assert_eq!(
            result.trace.states(),
            &[
                SandboxState::Idle,
                SandboxState::Preparing,
                SandboxState::Running,
                SandboxState::Completed,
                SandboxState::TornDown,
            ]
        );
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_without_leaking_worker() {
        let executor = executor_with_timeout(200);
        let started = Instant::now();
        let result = executor
            .execute_source(3, "x = 0\nwhile True:\n    x = x + 1")
            .await
            .unwrap();

        assert_eq!(result.outcome, ExecutionOutcome::TimedOut);
        assert!(!result.succeeded);
        assert!(result.raster_bytes.is_none());
        assert!(result.error_summary.as_deref().unwrap().starts_with("Timeout:"));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(executor.live_workers(), 0);
        assert_eq!(executor.in_flight_count(), 0);
        assert_eq!(result.trace.last(), Some(SandboxState::TornDown));
        assert!(result.trace.reached(SandboxState::TimedOut));
        assert!(matches!(result.issue(), Some(SnippetIssue::SandboxTimeout { .. })));
    }

    #[tokio::test]
    async fn test_name_error_is_summarized() {
        let executor = executor();
        let result = executor
            .execute_source(1, "import os\nos.system('ls')")
            .await
            .unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        let summary = result.error_summary.unwrap();
        assert!(summary.starts_with("ImportError:") || summary.starts_with("NameError:"));
        assert!(!summary.contains('\n'));
        assert!(result.trace.reached(SandboxState::Faulted));
        assert_eq!(result.trace.last(), Some(SandboxState::TornDown));
    }

    #[tokio::test]
    async fn test_syntax_error_never_runs() {
        let executor = executor();
        let result = executor.execute_source(0, "plt.plot([1, 2").await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        assert!(result.error_summary.unwrap().starts_with("SyntaxError:"));
        assert!(!result.trace.reached(SandboxState::Running));
        assert_eq!(result.steps, 0);
    }

    #[tokio::test]
    async fn test_runaway_nesting_faults_and_worker_survives() {
        let executor = executor();
        let result = executor
            .execute_source(0, "a = []\nfor i in range(2000000):\n    a = [a]\nplt.plot([1, 2])")
            .await
            .unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        assert!(result.error_summary.unwrap().starts_with("LimitExceeded:"));

        let next = executor.execute_source(1, "plt.plot([1, 2])").await.unwrap();
        assert!(next.succeeded);
    }

    #[tokio::test]
    async fn test_total_element_limit_faults() {
        let config = VizConfig {
            max_total_elements: 2_000_000,
            ..VizConfig::for_testing()
        };
        let executor = SandboxExecutor::with_backend(&config, Arc::new(RenderBackend::new()));
        let result = executor
            .execute_source(
                0,
                "keep = []\nfor i in range(100):\n    keep.append(np.ones(1000000))\nplt.plot([1, 2])",
            )
            .await
            .unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        let summary = result.error_summary.unwrap();
        assert!(summary.starts_with("LimitExceeded:"), "{}", summary);
        assert!(summary.contains("2000000"));
    }

    #[tokio::test]
    async fn test_snippet_without_drawing_is_empty() {
        let executor = executor();
        let result = executor
            .execute_source(0, "values = [1, 2, 3]\ntotal = sum(values)\nplt.title('nothing')")
            .await
            .unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Empty);
        assert!(!result.succeeded);
        assert!(result.error_summary.is_none());
        assert_eq!(result.issue(), Some(SnippetIssue::RenderEmpty));
    }

    #[tokio::test]
    async fn test_step_budget_faults_before_deadline() {
        let config = VizConfig {
            step_budget: 1_000,
            ..VizConfig::for_testing()
        };
        let executor = SandboxExecutor::with_backend(&config, Arc::new(RenderBackend::new()));
        let result = executor
            .execute_source(0, "while True:\n    pass")
            .await
            .unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        assert!(result.error_summary.unwrap().starts_with("LimitExceeded:"));
    }

    #[tokio::test]
    async fn test_state_does_not_bleed_between_executions() {
        let executor = executor();
        let first = executor
            .execute_source(0, "secret = 42\nplt.plot([1, 2, 3])")
            .await
            .unwrap();
        assert!(first.succeeded);

        let second = executor.execute_source(1, "plt.plot([secret])").await.unwrap();
        assert_eq!(second.outcome, ExecutionOutcome::Faulted);
        assert!(second.error_summary.unwrap().starts_with("NameError:"));

        let third = executor.execute_source(2, "x = 1").await.unwrap();
        assert_eq!(third.outcome, ExecutionOutcome::Empty);
    }

    #[tokio::test]
    async fn test_render_lock_released_on_every_path() {
        let backend = Arc::new(RenderBackend::new());
        let config = VizConfig {
            execution_timeout_ms: 150,
            ..VizConfig::for_testing()
        };
        let executor = SandboxExecutor::with_backend(&config, Arc::clone(&backend));

        for source in ["plot([1, 2])", "undefined_name", "while True:\n    pass", "x = 1"] {
            executor.execute_source(0, source).await.unwrap();
            assert!(!backend.is_busy(), "lock still held after {:?}", source);
            assert!(backend.acquire().await.is_clear());
        }
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_work() {
        let executor = executor();
        executor.shutdown(Duration::from_millis(50)).await;
        let err = executor.execute_source(0, "plot([1])").await.unwrap_err();
        assert!(matches!(err, PipelineError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_in_flight_snippet() {
        let executor = Arc::new(executor_with_timeout(30_000));
        let running = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor
                    .execute_source(0, "while True:\n    pass")
                    .await
            })
        };

        while executor.live_workers() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        executor.shutdown(Duration::from_millis(50)).await;

        let result = running.await.unwrap().unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Faulted);
        assert!(result.error_summary.unwrap().starts_with("Interrupted:"));
        assert_eq!(executor.in_flight_count(), 0);
    }

    #[test]
    fn test_trace_helpers() {
        let mut trace = ExecutionTrace::new();
        trace.record(SandboxState::Preparing);
        assert!(trace.reached(SandboxState::Idle));
        assert!(!trace.reached(SandboxState::Running));
        assert_eq!(trace.last(), Some(SandboxState::Preparing));
        assert!(SandboxState::TimedOut.is_terminal());
        assert!(!SandboxState::TornDown.is_terminal());
        assert_eq!(SandboxState::TimedOut.to_string(), "timed_out");
    }
}
