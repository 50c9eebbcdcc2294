//! Async operation lifecycle
//!
//! Every export and download action runs through an [`Operation`], which gives
//! it a uniform state contract: `Idle → Running → Succeeded | Failed`, with
//! cooperative cancellation and an optional timeout.
//!
//! Cancellation never surfaces as a failure. A cancelled execution returns the
//! state to [`OperationState::Idle`], skips `on_success`/`on_error`, and still
//! calls `on_finally` exactly once.
//!
//! The lifecycle does not preempt the operation function: the function receives
//! a [`CancellationToken`] and is expected to check it at its own suspension
//! points.
//!
//! ```
//! use tabula_export::lifecycle::{ExecuteOptions, Operation, Outcome};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let op: Operation<u32> = Operation::new("count-rows");
//! let outcome = op
//!     .execute(|_token| async { Ok(42) }, ExecuteOptions::default())
//!     .await;
//! assert!(matches!(outcome, Outcome::Succeeded(42)));
//! assert!(op.state().is_success());
//! # }
//! ```

use crate::error::{Error, ErrorDetail, Result};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Why an execution was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// [`Operation::cancel`] was called
    User,
    /// The execution timeout elapsed
    Timeout,
    /// The caller-supplied token was cancelled
    Parent,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::User => write!(f, "User cancelled"),
            CancelReason::Timeout => write!(f, "timeout"),
            CancelReason::Parent => write!(f, "cancelled by caller"),
        }
    }
}

/// Coarse lifecycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing running (initial state, and the state after cancellation)
    Idle,
    /// An execution is in flight
    Running,
    /// The last execution produced a result
    Succeeded,
    /// The last execution failed
    Failed,
}

/// Observable state of an [`Operation`]
#[derive(Clone, Debug, PartialEq)]
pub enum OperationState<T> {
    /// Nothing running
    Idle,
    /// An execution is in flight
    Running,
    /// The last execution produced this result
    Succeeded(T),
    /// The last execution failed with this error
    Failed(ErrorDetail),
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        OperationState::Idle
    }
}

impl<T> OperationState<T> {
    /// The phase without its payload
    pub fn phase(&self) -> Phase {
        match self {
            OperationState::Idle => Phase::Idle,
            OperationState::Running => Phase::Running,
            OperationState::Succeeded(_) => Phase::Succeeded,
            OperationState::Failed(_) => Phase::Failed,
        }
    }

    /// True while an execution is in flight
    pub fn is_loading(&self) -> bool {
        matches!(self, OperationState::Running)
    }

    /// True after a successful execution
    pub fn is_success(&self) -> bool {
        matches!(self, OperationState::Succeeded(_))
    }

    /// The result of the last successful execution
    pub fn result(&self) -> Option<&T> {
        match self {
            OperationState::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// The error of the last failed execution
    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            OperationState::Failed(detail) => Some(detail),
            _ => None,
        }
    }

    /// Flattened view for observers and UIs
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            loading: self.is_loading(),
            success: self.is_success(),
            error: self.error().cloned(),
        }
    }
}

/// Flattened, serializable state handed to `on_finally`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// An execution is in flight
    pub loading: bool,
    /// The last execution succeeded
    pub success: bool,
    /// The last execution's error, if it failed
    pub error: Option<ErrorDetail>,
}

/// What one [`Operation::execute`] call produced
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation function returned a value
    Succeeded(T),
    /// The operation function returned an error
    Failed(Error),
    /// The token was cancelled before or while the function completed
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// True if the execution was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    /// Convert into a `Result`, mapping cancellation to [`Error::Cancelled`]
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Succeeded(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Cancelled(reason) => Err(Error::Cancelled(reason)),
        }
    }

    /// The value, if the execution succeeded
    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

/// Callbacks fired around each execution
///
/// For one execution the order is `on_start`, then `on_success` or `on_error`
/// (neither when cancelled), then `on_finally` exactly once. A panic inside any
/// callback is caught and logged; it never affects the execution.
pub trait OperationObserver<T>: Send + Sync {
    /// The execution transitioned to running
    fn on_start(&self) {}

    /// The execution succeeded
    fn on_success(&self, _result: &T) {}

    /// The execution failed (never called for cancellation)
    fn on_error(&self, _error: &Error) {}

    /// The execution settled, whatever the outcome
    fn on_finally(&self, _snapshot: &StateSnapshot) {}
}

/// Per-call execution settings
#[derive(Clone, Debug)]
pub struct ExecuteOptions {
    /// Cancel with [`CancelReason::Timeout`] after this long; `None` or zero disables
    pub timeout: Option<Duration>,
    /// Caller-owned token; cancelling it cancels the execution
    pub cancel_token: Option<CancellationToken>,
    /// Reset the state to idle before starting (default: true)
    pub reset_on_start: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            cancel_token: None,
            reset_on_start: true,
        }
    }
}

impl ExecuteOptions {
    /// Options with a timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

struct Inflight {
    generation: u64,
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

/// A single logical operation (one per export button, one per download)
///
/// At most one execution is expected in flight. Starting a new execution while
/// one is running resets the observable state; when the older execution later
/// settles it does not overwrite the newer one's state.
pub struct Operation<T> {
    name: String,
    state: watch::Sender<OperationState<T>>,
    inflight: Mutex<Option<Inflight>>,
    generation: AtomicU64,
    observer: Option<Arc<dyn OperationObserver<T>>>,
}

impl<T> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an idle operation; `name` is used in log fields
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _rx) = watch::channel(OperationState::Idle);
        Self {
            name: name.into(),
            state,
            inflight: Mutex::new(None),
            generation: AtomicU64::new(0),
            observer: None,
        }
    }

    /// Attach an observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OperationObserver<T>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The operation's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> OperationState<T> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<OperationState<T>> {
        self.state.subscribe()
    }

    /// True while an execution is in flight
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Return the state to idle without cancelling anything
    pub fn reset(&self) {
        self.state.send_replace(OperationState::Idle);
    }

    /// Cancel the in-flight execution, if any
    ///
    /// The state returns to idle immediately, even though the operation
    /// function only stops at its next checkpoint. Returns false when nothing
    /// was running.
    pub fn cancel(&self) -> bool {
        let Some(inflight) = self.lock_inflight().take() else {
            return false;
        };

        let _ = inflight.reason.set(CancelReason::User);
        inflight.token.cancel();
        self.state.send_replace(OperationState::Idle);
        tracing::info!(operation = %self.name, "operation cancelled by user");
        true
    }

    /// Run `operation` through the lifecycle
    ///
    /// The function receives the execution's cancellation token. The returned
    /// [`Outcome`] is `Cancelled` whenever that token fired before or during
    /// completion, regardless of what the function returned.
    pub async fn execute<F, Fut>(&self, operation: F, options: ExecuteOptions) -> Outcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if options.reset_on_start {
            self.reset();
        }

        let token = match &options.cancel_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let reason = Arc::new(OnceLock::new());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.lock_inflight().replace(Inflight {
            generation,
            token: token.clone(),
            reason: reason.clone(),
        });
        if let Some(previous) = previous {
            tracing::debug!(
                operation = %self.name,
                previous = previous.generation,
                "starting while a previous execution is still in flight"
            );
        }

        let timer = options.timeout.filter(|t| !t.is_zero()).map(|timeout| {
            let token = token.clone();
            let reason = reason.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        let _ = reason.set(CancelReason::Timeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        self.state.send_replace(OperationState::Running);
        tracing::debug!(operation = %self.name, generation, "operation started");
        self.notify("on_start", |o| o.on_start());

        let result = operation(token.clone()).await;

        if let Some(timer) = timer {
            timer.abort();
        }

        let outcome = if token.is_cancelled() || matches!(result, Err(Error::Cancelled(_))) {
            let reason = reason
                .get()
                .copied()
                .or(match &result {
                    Err(Error::Cancelled(r)) => Some(*r),
                    _ => None,
                })
                .unwrap_or(CancelReason::Parent);
            self.settle(generation, OperationState::Idle);
            tracing::info!(operation = %self.name, reason = %reason, "operation cancelled");
            Outcome::Cancelled(reason)
        } else {
            match result {
                Ok(value) => {
                    self.settle(generation, OperationState::Succeeded(value.clone()));
                    tracing::debug!(operation = %self.name, "operation succeeded");
                    self.notify("on_success", |o| o.on_success(&value));
                    Outcome::Succeeded(value)
                }
                Err(error) => {
                    self.settle(generation, OperationState::Failed(ErrorDetail::from(&error)));
                    tracing::warn!(operation = %self.name, error = %error, "operation failed");
                    self.notify("on_error", |o| o.on_error(&error));
                    Outcome::Failed(error)
                }
            }
        };

        {
            let mut slot = self.lock_inflight();
            if slot.as_ref().is_some_and(|i| i.generation == generation) {
                *slot = None;
            }
        }

        let snapshot = match &outcome {
            Outcome::Succeeded(_) => StateSnapshot {
                loading: false,
                success: true,
                error: None,
            },
            Outcome::Failed(error) => StateSnapshot {
                loading: false,
                success: false,
                error: Some(ErrorDetail::from(error)),
            },
            Outcome::Cancelled(_) => StateSnapshot::default(),
        };
        self.notify("on_finally", |o| o.on_finally(&snapshot));

        outcome
    }

    fn settle(&self, generation: u64, state: OperationState<T>) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_replace(state);
        } else {
            tracing::debug!(
                operation = %self.name,
                generation,
                "stale execution settled; newer execution owns the state"
            );
        }
    }

    fn notify(&self, hook: &'static str, call: impl FnOnce(&dyn OperationObserver<T>)) {
        let Some(observer) = &self.observer else {
            return;
        };
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))) {
            tracing::error!(
                operation = %self.name,
                hook,
                panic = %panic_message(panic.as_ref()),
                "operation observer panicked"
            );
        }
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<Inflight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Cooperative cancellation checkpoint for operation functions
///
/// Returns [`Error::Cancelled`] once `token` has fired. The reason reported
/// here is provisional: [`Operation::execute`] substitutes the reason it
/// recorded when the token was cancelled.
pub fn checkpoint(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled(CancelReason::Parent))
    } else {
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<String>>,
        finals: StdMutex<Vec<StateSnapshot>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl OperationObserver<u32> for Recorder {
        fn on_start(&self) {
            self.calls.lock().unwrap().push("start".into());
        }
        fn on_success(&self, result: &u32) {
            self.calls.lock().unwrap().push(format!("success:{result}"));
        }
        fn on_error(&self, error: &Error) {
            self.calls.lock().unwrap().push(format!("error:{}", error.error_code()));
        }
        fn on_finally(&self, snapshot: &StateSnapshot) {
            self.calls.lock().unwrap().push("finally".into());
            self.finals.lock().unwrap().push(snapshot.clone());
        }
    }

    fn observed() -> (Arc<Operation<u32>>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let op = Operation::new("test").with_observer(recorder.clone());
        (Arc::new(op), recorder)
    }

    /// Waits for cancellation, then reports it the way well-behaved operations do
    async fn wait_for_cancel(token: CancellationToken) -> Result<u32> {
        token.cancelled().await;
        Err(Error::Cancelled(CancelReason::User))
    }

    #[tokio::test]
    async fn success_runs_hooks_in_order() {
        let (op, rec) = observed();
        let outcome = op.execute(|_| async { Ok(7) }, ExecuteOptions::default()).await;

        assert!(matches!(outcome, Outcome::Succeeded(7)));
        assert_eq!(op.state(), OperationState::Succeeded(7));
        assert_eq!(rec.calls(), ["start", "success:7", "finally"]);
        assert_eq!(
            rec.finals.lock().unwrap()[0],
            StateSnapshot {
                loading: false,
                success: true,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn failure_records_error_detail() {
        let (op, rec) = observed();
        let outcome = op
            .execute(
                |_| async { Err::<u32, _>(Error::Other("disk on fire".into())) },
                ExecuteOptions::default(),
            )
            .await;

        assert!(matches!(outcome, Outcome::Failed(Error::Other(_))));
        let state = op.state();
        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.error().unwrap().message, "disk on fire");
        assert_eq!(rec.calls(), ["start", "error:internal_error", "finally"]);
    }

    #[tokio::test]
    async fn state_is_running_while_in_flight() {
        let op = Arc::new(Operation::<u32>::new("running"));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = {
            let op = op.clone();
            tokio::spawn(async move {
                op.execute(
                    |_| async move {
                        rx.await.ok();
                        Ok(1)
                    },
                    ExecuteOptions::default(),
                )
                .await
            })
        };

        let mut states = op.subscribe();
        states.wait_for(|s| s.is_loading()).await.unwrap();
        assert!(op.is_loading());

        tx.send(()).unwrap();
        assert!(matches!(task.await.unwrap(), Outcome::Succeeded(1)));
        assert!(!op.is_loading());
    }

    #[tokio::test]
    async fn user_cancel_skips_success_and_error() {
        let (op, rec) = observed();
        let task = {
            let op = op.clone();
            tokio::spawn(async move { op.execute(wait_for_cancel, ExecuteOptions::default()).await })
        };

        op.subscribe().wait_for(|s| s.is_loading()).await.unwrap();
        assert!(op.cancel());
        assert_eq!(op.state(), OperationState::Idle);

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Outcome::Cancelled(CancelReason::User)));
        assert_eq!(op.state(), OperationState::Idle);
        assert_eq!(rec.calls(), ["start", "finally"]);
    }

    #[tokio::test]
    async fn cancel_with_nothing_running_is_noop() {
        let op = Operation::<u32>::new("idle");
        assert!(!op.cancel());
    }

    #[tokio::test]
    async fn timeout_cancels_with_timeout_reason() {
        let (op, rec) = observed();
        let outcome = op
            .execute(
                |token| async move {
                    token.cancelled().await;
                    Ok(1)
                },
                ExecuteOptions::with_timeout(Duration::from_millis(20)),
            )
            .await;

        assert!(matches!(outcome, Outcome::Cancelled(CancelReason::Timeout)));
        assert_eq!(rec.calls(), ["start", "finally"]);
    }

    #[tokio::test]
    async fn parent_token_abort_settles_idle() {
        let (op, rec) = observed();
        let parent = CancellationToken::new();
        {
            let parent = parent.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                parent.cancel();
            });
        }

        let outcome = op
            .execute(
                |token| async move {
                    token.cancelled().await;
                    Ok(1)
                },
                ExecuteOptions {
                    timeout: Some(Duration::from_secs(30)),
                    cancel_token: Some(parent),
                    reset_on_start: true,
                },
            )
            .await;

        assert!(matches!(outcome, Outcome::Cancelled(CancelReason::Parent)));
        assert_eq!(op.state(), OperationState::Idle);
        assert_eq!(
            rec.finals.lock().unwrap().as_slice(),
            [StateSnapshot {
                loading: false,
                success: false,
                error: None
            }]
        );
    }

    #[tokio::test]
    async fn result_after_cancellation_is_discarded() {
        let (op, rec) = observed();
        let task = {
            let op = op.clone();
            tokio::spawn(async move {
                op.execute(
                    |_token| async {
                        // Ignores the token entirely
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(99)
                    },
                    ExecuteOptions::default(),
                )
                .await
            })
        };

        op.subscribe().wait_for(|s| s.is_loading()).await.unwrap();
        op.cancel();

        assert!(task.await.unwrap().is_cancelled());
        assert_eq!(op.state(), OperationState::Idle);
        assert_eq!(rec.calls(), ["start", "finally"]);
    }

    #[tokio::test]
    async fn already_cancelled_parent_never_succeeds() {
        let (op, rec) = observed();
        let parent = CancellationToken::new();
        parent.cancel();

        let outcome = op
            .execute(
                |_| async { Ok(5) },
                ExecuteOptions {
                    cancel_token: Some(parent),
                    ..Default::default()
                },
            )
            .await;

        assert!(outcome.is_cancelled());
        assert_eq!(rec.calls(), ["start", "finally"]);
    }

    #[tokio::test]
    async fn observer_panic_is_contained() {
        struct Exploding;
        impl OperationObserver<u32> for Exploding {
            fn on_start(&self) {
                panic!("observer bug");
            }
        }

        let op = Operation::new("panicky").with_observer(Arc::new(Exploding));
        let outcome = op.execute(|_| async { Ok(3) }, ExecuteOptions::default()).await;
        assert!(matches!(outcome, Outcome::Succeeded(3)));
        assert!(op.state().is_success());
    }

    #[tokio::test]
    async fn stale_execution_does_not_clobber_newer_state() {
        let op = Operation::<u32>::new("overlap");

        let slow = op.execute(
            |_| async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(1)
            },
            ExecuteOptions::default(),
        );
        let fast = op.execute(|_| async { Ok(2) }, ExecuteOptions::default());

        let (slow, fast) = tokio::join!(slow, fast);
        assert!(matches!(slow, Outcome::Succeeded(1)));
        assert!(matches!(fast, Outcome::Succeeded(2)));
        assert_eq!(op.state(), OperationState::Succeeded(2));
    }

    #[tokio::test]
    async fn finally_fires_once_per_execute() {
        let (op, rec) = observed();
        op.execute(|_| async { Ok(1) }, ExecuteOptions::default()).await;
        op.execute(
            |_| async { Err::<u32, _>(Error::Other("x".into())) },
            ExecuteOptions::default(),
        )
        .await;

        let finals = rec.calls().iter().filter(|c| *c == "finally").count();
        assert_eq!(finals, 2);
    }

    #[test]
    fn outcome_into_result_maps_cancellation() {
        let err = Outcome::<u32>::Cancelled(CancelReason::Timeout)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(CancelReason::Timeout)));
    }

    #[test]
    fn cancel_reason_display() {
        assert_eq!(CancelReason::User.to_string(), "User cancelled");
        assert_eq!(CancelReason::Timeout.to_string(), "timeout");
    }
}
