//! Error types for the worker pool.
//!
//! This module defines the central `Error` enum, which captures all
//! recoverable and reportable error cases at the pool boundary, and
//! [`TaskError`], the per-task failure carried inside a
//! [`TaskResult`](crate::TaskResult).
//!
//! ## Error Cases
//! - `PoolClosed`: A task was submitted while the pool was draining or
//!   stopped.
//! - `Cancelled`: A task was submitted after the pool's cancellation token
//!   fired.
//! - `InvalidCapacity`: The pool was started with zero workers.
//! - `InvalidConfig`: A non-capacity configuration value was out of bounds.
//! - `Channel`: An internal communication failure between tasks or workers.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for pool-level operations.
///
/// A single task's failure is never surfaced here; it is captured as data in
/// its [`TaskResult`](crate::TaskResult) instead, so one bad task cannot
/// abort its siblings or the pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The pool no longer accepts submissions (draining or stopped).
    #[error("pool is closed to new submissions")]
    PoolClosed,

    /// The pool's cancellation token fired; pending work is being discarded.
    #[error("pool was cancelled")]
    Cancelled,

    /// The pool was constructed with `capacity < 1`.
    #[error("invalid capacity: {got} (must be at least 1)")]
    InvalidCapacity { got: usize },

    /// A configuration value other than capacity was invalid.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("channel error: {context}")]
    Channel { context: String },
}

/// Failure outcome of executing a single task.
///
/// Distinguishes an ordinary compute failure from cooperative abandonment:
/// a [`TaskError::Cancelled`] result means the task observed the pool's
/// cancellation signal at a checkpoint, not that its own logic failed.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The task's own compute returned an error.
    #[error("task failed: {reason}")]
    Failed { reason: String },

    /// The task's compute panicked; the panic was caught and the worker
    /// survived.
    #[error("task panicked: {reason}")]
    Panicked { reason: String },

    /// The task was abandoned at a cancellation checkpoint.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Shorthand for an ordinary compute failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}
