use super::manager::PoolCounters;
use crate::error::TaskError;
use crate::task::{CancelSignal, Task, TaskResult};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Message type received by each worker over its bounded intake channel.
pub(crate) enum WorkRequest<P, R> {
    /// Execute one task and deliver its result to the originating batch's
    /// result channel.
    Run {
        task: Task<P, R>,
        result_tx: mpsc::Sender<TaskResult<R>>,
    },
    /// Signal the worker to stop and acknowledge shutdown.
    Shutdown { response: oneshot::Sender<()> },
}

/// Worker task responsible for processing [`WorkRequest`] messages.
///
/// Each worker pulls requests off its own bounded MPSC channel and executes
/// them one at a time, which is what bounds the pool's concurrency at its
/// worker count. The synchronous compute closure runs on Tokio's blocking
/// thread pool while the worker awaits it, so long compute bodies occupy
/// blocking threads rather than starving the async runtime (and its time
/// driver). The cancellation token is checked before every claimed task:
/// work that was queued but not yet started when cancellation fired is
/// discarded without producing a result, while a task already executing is
/// expected to observe the same signal at its next checkpoint and return a
/// cancelled result.
///
/// This function is designed to be spawned as a Tokio task and runs until a
/// [`WorkRequest::Shutdown`] arrives or the intake channel closes.
pub(crate) async fn worker_loop<P, R>(
    _worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest<P, R>>,
    cancel: CancellationToken,
    counters: Arc<PoolCounters>,
) where
    P: Send + 'static,
    R: Send + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    let signal = CancelSignal::new(cancel.clone());

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Run { task, result_tx } => {
                if cancel.is_cancelled() {
                    // Queued but never started: discarded, no result.
                    counters.queued.fetch_sub(1, Ordering::AcqRel);

                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_worker_id} discarded {} (cancelled)", task.id());
                    drop(task);
                    continue;
                }

                // Mark executing before clearing queued so the pending count
                // never momentarily drops to zero mid-transfer.
                counters.executing.fetch_add(1, Ordering::AcqRel);
                counters.queued.fetch_sub(1, Ordering::AcqRel);

                let task_id = task.id();
                let task_signal = signal.clone();
                let result =
                    match tokio::task::spawn_blocking(move || task.run(&task_signal)).await {
                        Ok(result) => result,
                        // `run` catches unwinds itself, so a join error here
                        // means the blocking task was torn down externally.
                        Err(e) => TaskResult {
                            task_id,
                            outcome: Err(TaskError::Panicked {
                                reason: e.to_string(),
                            }),
                        },
                    };

                // A closed result channel means the batch was abandoned;
                // the result is dropped with it.
                if let Err(_e) = result_tx.send(result).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {_worker_id} could not deliver result: {_e}");
                }

                counters.executing.fetch_sub(1, Ordering::AcqRel);
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}
