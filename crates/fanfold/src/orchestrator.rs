//! Batch execution against a worker pool.
//!
//! The [`Orchestrator`] submits a batch of tasks to a [`WorkerPool`],
//! collects their results through a [`FanInCollector`], and enforces a
//! wall-clock timeout. Submission runs on a spawned feeder task so that a
//! backpressured `submit` can never deadlock against result collection.
//!
//! On timeout the orchestrator cancels the pool and then waits for started
//! work to reach a cancellation checkpoint before returning, so no task is
//! still executing once the call resolves. A compute body that ignores its
//! checkpoints can outlive the batch in the background; the pool cannot
//! preempt it, only stop listening.

use crate::collector::FanInCollector;
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::task::{Task, TaskId, TaskResult};
use core::pin::pin;
use core::time::Duration;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

/// The outcome of one [`Orchestrator::run_batch`] call.
///
/// Always delivered, possibly partial: a batch caller never hangs past its
/// timeout and never loses results without the `timed_out`/partial flags
/// saying so.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// Results keyed by originating task id.
    pub results: HashMap<TaskId, TaskResult<R>>,
    /// `true` if the batch deadline elapsed before every result arrived.
    pub timed_out: bool,
    submitted: usize,
}

impl<R> BatchOutcome<R> {
    /// Number of tasks the batch was asked to run.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// `true` if every submitted task produced a result.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.submitted
    }

    /// `true` if some submitted tasks never produced a result (timeout or
    /// cancellation before they started).
    pub fn is_partial(&self) -> bool {
        !self.is_complete()
    }
}

/// Drives batches of tasks through a shared [`WorkerPool`].
///
/// Orchestrators are cheap handles; independently-constructed orchestrators
/// may target the same pool concurrently. Each batch routes results through
/// its own channel and scopes its expected count to a dedicated collector,
/// so concurrent batches cannot corrupt each other's accounting. Batch state
/// lives only for the duration of one `run_batch` call.
#[derive(Debug)]
pub struct Orchestrator<P, R> {
    pool: Arc<WorkerPool<P, R>>,
}

impl<P, R> Orchestrator<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Creates an orchestrator targeting `pool`.
    pub fn new(pool: Arc<WorkerPool<P, R>>) -> Self {
        Self { pool }
    }

    /// The pool this orchestrator submits to.
    pub fn pool(&self) -> &Arc<WorkerPool<P, R>> {
        &self.pool
    }

    /// Runs `tasks` to completion or until `timeout` elapses.
    ///
    /// Returns the full result set keyed by task id, or a partial set with
    /// `timed_out = true` if the deadline fired first. On timeout the pool
    /// is cancelled before returning: queued tasks are discarded without a
    /// result, and tasks already executing abandon at their next checkpoint,
    /// delivering a cancelled result that is still included in the set.
    ///
    /// An empty batch resolves immediately without submitting anything.
    ///
    /// # Errors
    ///
    /// Fails only on pool-level errors surfaced by submission before any
    /// cancellation fired (e.g. running a batch against a drained pool).
    pub async fn run_batch(
        &self,
        tasks: Vec<Task<P, R>>,
        timeout: Duration,
    ) -> Result<BatchOutcome<R>> {
        let submitted = tasks.len();
        if submitted == 0 {
            return Ok(BatchOutcome {
                results: HashMap::new(),
                timed_out: false,
                submitted,
            });
        }

        let deadline = Instant::now() + timeout;
        let (result_tx, result_rx) = mpsc::channel(self.pool.config().outtake_depth);
        let mut collector =
            FanInCollector::new(result_rx, submitted, self.pool.cancellation_token());

        // Submission happens on its own task: with bounded intake channels,
        // submitting and collecting from the same flow could deadlock once
        // the batch outgrows the pool's buffering.
        let feeder = tokio::spawn(feed_tasks(Arc::clone(&self.pool), tasks, result_tx));

        let mut results: HashMap<TaskId, TaskResult<R>> = HashMap::with_capacity(submitted);
        let mut timed_out = false;

        while !collector.is_complete() {
            match timeout_at(deadline, collector.next()).await {
                Ok(Some(result)) => {
                    results.insert(result.task_id, result);
                }
                // Collector stopped early: cancellation fired elsewhere, or
                // submission failed and dropped the remaining senders.
                Ok(None) => break,
                Err(_elapsed) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "Batch timed out with {}/{} results",
                        results.len(),
                        submitted
                    );
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            self.pool.cancel_all();
        }
        if !collector.is_complete() {
            self.wind_down(&mut collector, &mut results).await;
        }

        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Submission errors after cancellation are expected; the
                // tasks that were refused simply have no result. Anything
                // else (e.g. a drained pool) is a caller-visible failure.
                if !self.pool.cancellation_token().is_cancelled() {
                    return Err(e);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!("Feeder stopped early: {e}");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Feeder task failed: {_e}");
                return Err(Error::Channel {
                    context: "feeder task failed".to_string(),
                });
            }
        }

        Ok(BatchOutcome {
            results,
            timed_out,
            submitted,
        })
    }

    /// Keeps collecting while the pool winds down after cancellation.
    ///
    /// Started tasks are still entitled to deliver their (usually cancelled)
    /// results; consuming them here also keeps workers from blocking on a
    /// full result channel. Ends when every producer is accounted for or
    /// when the pool reports idle, with one final sweep of buffered results.
    async fn wind_down(
        &self,
        collector: &mut FanInCollector<R>,
        results: &mut HashMap<TaskId, TaskResult<R>>,
    ) {
        let mut idle = pin!(self.pool.quiesce());

        loop {
            tokio::select! {
                maybe = collector.recv_ignoring_cancel() => match maybe {
                    Some(result) => {
                        results.insert(result.task_id, result);
                    }
                    // Channel closed: every result is in. The last worker may
                    // still be clearing its executing count, so wait for the
                    // pool to report idle before handing control back.
                    None => {
                        (&mut idle).await;
                        break;
                    }
                },
                _drained = &mut idle => {
                    while let Some(result) = collector.drain_ready() {
                        results.insert(result.task_id, result);
                    }
                    break;
                }
            }
        }
    }
}

/// Submits every task of a batch, stopping at the first pool-level refusal.
async fn feed_tasks<P, R>(
    pool: Arc<WorkerPool<P, R>>,
    tasks: Vec<Task<P, R>>,
    result_tx: mpsc::Sender<TaskResult<R>>,
) -> Result<()>
where
    P: Send + 'static,
    R: Send + 'static,
{
    for task in tasks {
        pool.submit(task, result_tx.clone()).await?;
    }
    Ok(())
}
