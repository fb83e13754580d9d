//! Task identity, payload, and execution.
//!
//! A [`Task`] pairs an opaque [`TaskId`] with a payload and a compute
//! closure. The task is immutable once created: it is owned by the submitter
//! until handed to the pool, then moved into whichever worker claims it. The
//! worker that executes it produces exactly one [`TaskResult`], tagged with
//! the originating id so callers can correlate results that arrive in
//! completion order.

use crate::error::TaskError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Process-wide counter backing [`TaskId`] allocation.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque, process-unique identity of a submitted task.
///
/// Ids carry no meaning beyond equality and hashing; they exist so results
/// delivered in completion order can be matched back to their task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Cooperative cancellation signal handed to every compute closure.
///
/// Long-running compute bodies are expected to call [`checkpoint`] (or
/// [`is_cancelled`]) at safe points; the pool never preempts a task, it only
/// raises this signal.
///
/// [`checkpoint`]: CancelSignal::checkpoint
/// [`is_cancelled`]: CancelSignal::is_cancelled
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Safe-point check for use inside compute bodies.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Cancelled`] once cancellation has been requested,
    /// so a compute body can abandon work with `signal.checkpoint()?`.
    pub fn checkpoint(&self) -> core::result::Result<(), TaskError> {
        if self.token.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

type Compute<P, R> =
    Box<dyn FnOnce(P, &CancelSignal) -> core::result::Result<R, TaskError> + Send + 'static>;

/// A unit of work: an input payload plus a pure computation over it.
///
/// The compute closure receives the payload by value and a [`CancelSignal`]
/// to poll at safe points. It must not touch shared mutable state; all
/// coordination happens through the pool's channels.
pub struct Task<P, R> {
    id: TaskId,
    payload: P,
    compute: Compute<P, R>,
}

impl<P, R> Task<P, R> {
    /// Creates a task with a freshly allocated [`TaskId`].
    pub fn new<F>(payload: P, compute: F) -> Self
    where
        F: FnOnce(P, &CancelSignal) -> core::result::Result<R, TaskError> + Send + 'static,
    {
        Self {
            id: TaskId::next(),
            payload,
            compute: Box::new(compute),
        }
    }

    /// The task's identity, stable from creation through its result.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Executes the compute closure, converting any outcome into a
    /// [`TaskResult`].
    ///
    /// A panic inside the closure is caught and surfaced as
    /// [`TaskError::Panicked`] so the worker loop survives.
    pub(crate) fn run(self, signal: &CancelSignal) -> TaskResult<R> {
        let Self {
            id,
            payload,
            compute,
        } = self;

        let outcome = match catch_unwind(AssertUnwindSafe(|| compute(payload, signal))) {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panicked {
                reason: panic_reason(panic),
            }),
        };

        TaskResult { task_id: id, outcome }
    }
}

impl<P, R> core::fmt::Debug for Task<P, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}

// Downcasts the owned payload box itself; taking a reference first would
// erase to the box's own type and never match the message inside.
fn panic_reason(panic: Box<dyn core::any::Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(s) => *s,
        Err(panic) => match panic.downcast::<&str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

/// The tagged outcome of executing one [`Task`].
///
/// Immutable after creation. `task_id` is a back-reference for correlation
/// only; results arrive in completion order, not submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<R> {
    pub task_id: TaskId,
    pub outcome: core::result::Result<R, TaskError>,
}

impl<R> TaskResult<R> {
    /// Returns `true` if the task produced a value.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns `true` if the task was abandoned at a cancellation
    /// checkpoint.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(TaskError::Cancelled))
    }
}
