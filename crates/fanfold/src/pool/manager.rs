//! Bounded pool of asynchronous workers.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed-size set
//! of workers, dispatches submitted [`Task`]s across them round-robin over
//! bounded channels, and coordinates cancellation and shutdown via a shared
//! [`CancellationToken`].
//!
//! Each worker listens on its own bounded [`mpsc::Receiver`] and executes
//! tasks independently, so at most `capacity` tasks ever run at once and a
//! full intake channel suspends the submitter instead of dropping work.

use super::worker::{WorkRequest, worker_loop};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::task::{Task, TaskResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Pool lifecycle states.
///
/// Transitions are one-way: `Created -> Running -> Draining -> Stopped`.
/// There is no resurrection; a stopped pool stays stopped. Cancellation is
/// orthogonal and never changes the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// Constructed, workers not yet spawned. Only observable inside
    /// [`WorkerPool::start`].
    Created = 0,
    /// Workers running, submissions accepted.
    Running = 1,
    /// No new submissions; queued work is finishing.
    Draining = 2,
    /// All workers have exited.
    Stopped = 3,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Work-in-progress counters shared between the pool and its workers.
///
/// `queued` counts tasks accepted by `submit` that no worker has started;
/// `executing` counts tasks currently inside their compute closure (through
/// result delivery). Together they tell `drain` and `quiesce` when the pool
/// is idle.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) queued: AtomicUsize,
    pub(crate) executing: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn pending(&self) -> usize {
        self.queued.load(Ordering::Acquire) + self.executing.load(Ordering::Acquire)
    }
}

/// A cooperative pool of asynchronous workers executing submitted [`Task`]s.
///
/// Workers receive tasks over bounded MPSC channels fed in round-robin
/// order. The pool supports graceful drain, pool-wide cooperative
/// cancellation, and per-batch result routing: every submission names the
/// result channel its outcome is delivered to, so independent batches can
/// share one pool without crossing results.
pub struct WorkerPool<P, R> {
    workers: Vec<mpsc::Sender<WorkRequest<P, R>>>,
    next_worker: AtomicUsize,
    cancel: CancellationToken,
    lifecycle: AtomicU8,
    counters: Arc<PoolCounters>,
    config: PoolConfig,
}

impl<P, R> WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Validates `config` and spawns `config.capacity` workers.
    ///
    /// Must be called from within a Tokio runtime, since workers are spawned
    /// as Tokio tasks. The pool enters [`Lifecycle::Running`] before this
    /// returns.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCapacity`] if `config.capacity < 1`.
    /// - [`Error::InvalidConfig`] if a channel depth is zero.
    pub fn start(config: PoolConfig) -> Result<Arc<Self>> {
        if config.capacity < 1 {
            return Err(Error::InvalidCapacity {
                got: config.capacity,
            });
        }
        if config.intake_depth < 1 {
            return Err(Error::InvalidConfig {
                reason: "intake_depth must be at least 1".to_string(),
            });
        }
        if config.outtake_depth < 1 {
            return Err(Error::InvalidConfig {
                reason: "outtake_depth must be at least 1".to_string(),
            });
        }

        let cancel = CancellationToken::new();
        let counters = Arc::new(PoolCounters::default());
        let lifecycle = AtomicU8::new(Lifecycle::Created as u8);

        let mut workers = Vec::with_capacity(config.capacity);
        for worker_id in 0..config.capacity {
            // One bounded channel per worker. A worker executes at most one
            // task at a time, so the pool-wide concurrency bound is exactly
            // the worker count; intake_depth only controls how much work may
            // queue ahead of each worker before `submit` suspends.
            let (tx, rx) = mpsc::channel(config.intake_depth);
            workers.push(tx);

            tokio::spawn(worker_loop(
                worker_id,
                rx,
                cancel.clone(),
                Arc::clone(&counters),
            ));
        }

        lifecycle.store(Lifecycle::Running as u8, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::debug!("Pool started with {} workers", config.capacity);

        Ok(Arc::new(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            cancel,
            lifecycle,
            counters,
            config,
        }))
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Enqueues one task, routing its eventual result to `result_tx`.
    ///
    /// Suspends while the target worker's intake channel is full; a task is
    /// never silently dropped at this boundary. The suspension is the pool's
    /// backpressure point.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] if the pool is draining or stopped.
    /// - [`Error::Cancelled`] if the pool's cancellation token fired, either
    ///   before submission or while waiting for intake space. The task is
    ///   not enqueued in that case and produces no result.
    /// - [`Error::Channel`] if the worker's channel closed unexpectedly.
    pub async fn submit(&self, task: Task<P, R>, result_tx: mpsc::Sender<TaskResult<R>>) -> Result<()> {
        if self.lifecycle() != Lifecycle::Running {
            return Err(Error::PoolClosed);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        // Reserve-then-send keeps this cancellation-safe: nothing is counted
        // or enqueued until a slot is held, so dropping a suspended submit
        // (or losing the race against cancellation) leaves no trace.
        tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            reserved = worker.reserve() => match reserved {
                Ok(permit) => {
                    self.counters.queued.fetch_add(1, Ordering::AcqRel);
                    permit.send(WorkRequest::Run { task, result_tx });
                    Ok(())
                }
                Err(_) => Err(Error::Channel {
                    context: format!("worker {worker_idx} channel closed"),
                }),
            },
        }
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Transitions `Running -> Draining`, refusing new submissions.
    /// - Waits (up to `shutdown_timeout`) for queued and executing work to
    ///   finish.
    /// - Sends a shutdown request to each worker and waits (up to
    ///   `shutdown_timeout` per worker) for acknowledgements.
    /// - Transitions to `Stopped`.
    ///
    /// Idempotent: callers that lose the `Running -> Draining` race simply
    /// wait for the winner to finish the transition to `Stopped`.
    pub async fn drain(&self) {
        if self
            .lifecycle
            .compare_exchange(
                Lifecycle::Running as u8,
                Lifecycle::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            while self.lifecycle() != Lifecycle::Stopped {
                sleep(self.config.drain_poll_interval).await;
            }
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Draining pool ({} tasks pending)", self.pending());

        let drain_result = timeout(self.config.shutdown_timeout, async {
            while self.counters.pending() > 0 {
                sleep(self.config.drain_poll_interval).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All pending tasks drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} tasks still pending)",
                    self.pending()
                );
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let ack_timeout = self.config.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(ack_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        self.lifecycle
            .store(Lifecycle::Stopped as u8, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::info!("Pool shutdown complete");
    }

    /// Requests cooperative cancellation of all queued and in-flight work.
    ///
    /// Queued tasks are discarded by workers without producing a result;
    /// tasks already executing observe the signal at their next checkpoint
    /// and yield a cancelled result. Valid while running or draining; does
    /// not change the lifecycle state.
    pub fn cancel_all(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Cancelling all work ({} queued, {} executing)",
            self.queued(),
            self.executing()
        );
        self.cancel.cancel();
    }

    /// Waits until no task is queued or executing.
    ///
    /// Bounded by `shutdown_timeout`; returns `false` if work was still
    /// pending when the window elapsed, which can only happen when a compute
    /// body ignores its cancellation checkpoints. Such work may finish in
    /// the background; the pool cannot preempt it.
    pub async fn quiesce(&self) -> bool {
        let idle = timeout(self.config.shutdown_timeout, async {
            while self.counters.pending() > 0 {
                sleep(self.config.drain_poll_interval).await;
            }
        })
        .await;

        #[cfg(feature = "tracing")]
        if idle.is_err() {
            tracing::warn!("Quiesce timed out ({} tasks still pending)", self.pending());
        }

        idle.is_ok()
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// Number of workers, which is also the concurrency bound.
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Tasks accepted but not yet started by any worker.
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::Acquire)
    }

    /// Tasks currently inside their compute closure.
    pub fn executing(&self) -> usize {
        self.counters.executing.load(Ordering::Acquire)
    }

    /// Total work the pool still owes a verdict on.
    pub fn pending(&self) -> usize {
        self.counters.pending()
    }

    /// The pool's shared cancellation token.
    ///
    /// Collectors wait on this token to stop early when [`cancel_all`] (or a
    /// batch timeout) fires.
    ///
    /// [`cancel_all`]: WorkerPool::cancel_all
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<P, R> core::fmt::Debug for WorkerPool<P, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.workers.len())
            .field("lifecycle", &Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire)))
            .field("queued", &self.counters.queued.load(Ordering::Acquire))
            .field("executing", &self.counters.executing.load(Ordering::Acquire))
            .finish()
    }
}
