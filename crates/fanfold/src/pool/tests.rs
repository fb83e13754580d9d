use crate::{
    CancelSignal, Error, FanInCollector, Lifecycle, PoolConfig, Task, TaskError, TaskResult,
    WorkerPool,
};
use core::time::Duration;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

type TestResult = core::result::Result<usize, TaskError>;

fn ok_task(value: usize) -> Task<usize, usize> {
    Task::new(value, |v, _| -> TestResult { Ok(v) })
}

/// A task that parks at its cancellation checkpoint until the signal fires,
/// flagging `started` as soon as a worker claims it.
fn parked_task(started: Arc<AtomicBool>) -> Task<usize, usize> {
    Task::new(0, move |_, signal: &CancelSignal| -> TestResult {
        started.store(true, Ordering::Release);
        loop {
            signal.checkpoint()?;
            std::thread::sleep(Duration::from_millis(1));
        }
    })
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrency_never_exceeds_capacity() {
    const CAPACITY: usize = 4;
    const TASKS: usize = 32;

    let pool = WorkerPool::start(PoolConfig {
        capacity: CAPACITY,
        intake_depth: 2,
        ..Default::default()
    })
    .unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (result_tx, result_rx) = mpsc::channel(TASKS);

    let mut submitted_ids = HashSet::new();
    for value in 0..TASKS {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let task = Task::new(value, move |v, _| -> TestResult {
            let now = current.fetch_add(1, Ordering::AcqRel) + 1;
            peak.fetch_max(now, Ordering::AcqRel);
            std::thread::sleep(Duration::from_millis(2));
            current.fetch_sub(1, Ordering::AcqRel);
            Ok(v)
        });
        submitted_ids.insert(task.id());
        pool.submit(task, result_tx.clone()).await.unwrap();
    }
    drop(result_tx);

    let mut collector = FanInCollector::new(result_rx, TASKS, pool.cancellation_token());
    let mut seen_ids = HashSet::new();
    while let Some(result) = collector.next().await {
        assert!(result.is_ok());
        assert!(seen_ids.insert(result.task_id), "result delivered twice");
    }

    assert!(collector.is_complete());
    assert_eq!(seen_ids, submitted_ids);
    assert!(
        peak.load(Ordering::Acquire) <= CAPACITY,
        "observed {} concurrent tasks with capacity {}",
        peak.load(Ordering::Acquire),
        CAPACITY
    );

    pool.drain().await;
}

#[tokio::test]
async fn start_rejects_zero_capacity() {
    let err = WorkerPool::<usize, usize>::start(PoolConfig::with_capacity(0)).unwrap_err();
    assert_eq!(err, Error::InvalidCapacity { got: 0 });
}

#[tokio::test]
async fn start_rejects_zero_intake_depth() {
    let err = WorkerPool::<usize, usize>::start(PoolConfig {
        capacity: 1,
        intake_depth: 0,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_is_idempotent_and_closes_submission() {
    let pool = WorkerPool::start(PoolConfig::with_capacity(2)).unwrap();
    assert_eq!(pool.lifecycle(), Lifecycle::Running);

    pool.drain().await;
    assert_eq!(pool.lifecycle(), Lifecycle::Stopped);

    // Second drain is a no-op on an already-stopped pool.
    pool.drain().await;
    assert_eq!(pool.lifecycle(), Lifecycle::Stopped);

    let (result_tx, _result_rx) = mpsc::channel(1);
    let err = pool.submit(ok_task(1), result_tx).await.unwrap_err();
    assert_eq!(err, Error::PoolClosed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_drains_converge() {
    let pool = WorkerPool::<usize, usize>::start(PoolConfig::with_capacity(2)).unwrap();
    tokio::join!(pool.drain(), pool.drain());
    assert_eq!(pool.lifecycle(), Lifecycle::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_lets_queued_tasks_finish() {
    const TASKS: usize = 8;
    let pool = WorkerPool::start(PoolConfig {
        capacity: 2,
        intake_depth: TASKS,
        ..Default::default()
    })
    .unwrap();

    let (result_tx, mut result_rx) = mpsc::channel(TASKS);
    for value in 0..TASKS {
        let task = Task::new(value, |v, _| -> TestResult {
            std::thread::sleep(Duration::from_millis(2));
            Ok(v)
        });
        pool.submit(task, result_tx.clone()).await.unwrap();
    }
    drop(result_tx);

    pool.drain().await;
    assert_eq!(pool.pending(), 0);

    let mut delivered = 0;
    while result_rx.recv().await.is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn cancel_discards_queued_tasks_without_results() {
    const TASKS: usize = 10;

    let pool = WorkerPool::start(PoolConfig {
        capacity: 1,
        intake_depth: TASKS,
        ..Default::default()
    })
    .unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let (result_tx, result_rx) = mpsc::channel(TASKS);

    pool.submit(parked_task(Arc::clone(&started)), result_tx.clone())
        .await
        .unwrap();
    for value in 1..TASKS {
        pool.submit(ok_task(value), result_tx.clone()).await.unwrap();
    }
    drop(result_tx);

    // Cancel once the single worker has claimed the first task; everything
    // behind it is queued and must be discarded without a result.
    wait_until(|| started.load(Ordering::Acquire)).await;
    pool.cancel_all();

    // Wait for the worker to settle first so the started task's cancelled
    // result is already buffered when the collector runs.
    assert!(pool.quiesce().await);
    assert_eq!(pool.pending(), 0);

    let mut collector = FanInCollector::new(result_rx, TASKS, pool.cancellation_token());
    let mut results: Vec<TaskResult<usize>> = Vec::new();
    while let Some(result) = collector.next().await {
        results.push(result);
    }

    // Exactly the one started task reports back, tagged cancelled.
    assert_eq!(results.len(), 1);
    assert!(results[0].is_cancelled());
    assert!(!collector.is_complete());

    assert_eq!(pool.lifecycle(), Lifecycle::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn submit_backpressures_when_intake_is_full() {
    let pool = WorkerPool::start(PoolConfig {
        capacity: 1,
        intake_depth: 1,
        ..Default::default()
    })
    .unwrap();

    let release = Arc::new(AtomicBool::new(false));
    let (result_tx, mut result_rx) = mpsc::channel(8);

    let gate = Arc::clone(&release);
    let blocker = Task::new(0, move |v, _| -> TestResult {
        while !gate.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(v)
    });
    pool.submit(blocker, result_tx.clone()).await.unwrap();
    wait_until(|| pool.executing() == 1).await;

    // Fills the worker's single intake slot.
    pool.submit(ok_task(1), result_tx.clone()).await.unwrap();

    // With the worker busy and its intake full, a third submission must
    // suspend rather than drop the task.
    let suspended = pool.submit(ok_task(2), result_tx.clone());
    assert!(
        timeout(Duration::from_millis(50), suspended).await.is_err(),
        "submit should backpressure while intake is full"
    );

    release.store(true, Ordering::Release);
    pool.submit(ok_task(3), result_tx.clone()).await.unwrap();
    drop(result_tx);

    let mut delivered = 0;
    while result_rx.recv().await.is_some() {
        delivered += 1;
    }
    // Tasks 0, 1, and 3; task 2's submission was abandoned by the caller.
    assert_eq!(delivered, 3);

    pool.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_survives_panicking_task() {
    let pool = WorkerPool::start(PoolConfig::with_capacity(1)).unwrap();
    let (result_tx, mut result_rx) = mpsc::channel(4);

    pool.submit(
        Task::new(0, |_, _| -> TestResult { panic!("task exploded") }),
        result_tx.clone(),
    )
    .await
    .unwrap();
    pool.submit(ok_task(7), result_tx.clone()).await.unwrap();
    drop(result_tx);

    let first = result_rx.recv().await.unwrap();
    assert!(matches!(first.outcome, Err(TaskError::Panicked { .. })));

    // The same (sole) worker is still alive and executes the next task.
    let second = result_rx.recv().await.unwrap();
    assert_eq!(second.outcome, Ok(7));

    pool.drain().await;
}

#[tokio::test]
async fn debug_formatting_reports_pool_state() {
    let pool = WorkerPool::<usize, usize>::start(PoolConfig::with_capacity(2)).unwrap();

    let rendered = format!("{pool:?}");
    assert!(rendered.contains("capacity: 2"), "unexpected debug output: {rendered}");
    assert!(rendered.contains("Running"), "unexpected debug output: {rendered}");

    pool.drain().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_after_cancel_reports_cancelled() {
    let pool = WorkerPool::<usize, usize>::start(PoolConfig::with_capacity(1)).unwrap();
    pool.cancel_all();

    let (result_tx, _result_rx) = mpsc::channel(1);
    let err = pool.submit(ok_task(1), result_tx).await.unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(pool.lifecycle(), Lifecycle::Running);

    pool.drain().await;
}
