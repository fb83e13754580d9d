use core::hint::black_box;
use core::time::Duration;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use fanfold::{Orchestrator, PoolConfig, Task, TaskError, WorkerPool};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Builder;

// Number of tasks executed per benchmark iteration.
const TOTAL_TASKS: usize = 1024;

/// Benchmarks `run_batch` throughput across worker counts.
fn bench_run_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/run_batch");

    let max_workers = num_cpus::get().max(1);
    for capacity in [1, 2, 4, 8, max_workers] {
        group.throughput(Throughput::Elements(TOTAL_TASKS as u64));
        group.bench_function(
            format!("elems/{}/workers/{}", TOTAL_TASKS, capacity),
            |b| {
                let rt = Builder::new_multi_thread()
                    .enable_time()
                    .build()
                    .expect("runtime");

                b.iter_custom(|iters| {
                    rt.block_on(async move {
                        let start = Instant::now();

                        for _ in 0..iters {
                            let pool = WorkerPool::start(PoolConfig {
                                capacity,
                                intake_depth: 4,
                                ..Default::default()
                            })
                            .expect("pool start");
                            let orchestrator = Orchestrator::new(Arc::clone(&pool));

                            let tasks: Vec<_> = (0..TOTAL_TASKS as u64)
                                .map(|n| {
                                    Task::new(n, |n, _| -> Result<u64, TaskError> {
                                        Ok(black_box(n.wrapping_mul(31)))
                                    })
                                })
                                .collect();

                            let outcome = orchestrator
                                .run_batch(tasks, Duration::from_secs(30))
                                .await
                                .expect("batch");
                            assert!(outcome.is_complete());
                            black_box(outcome.results.len());

                            pool.drain().await;
                        }

                        start.elapsed()
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_run_batch);
criterion_main!(benches);
