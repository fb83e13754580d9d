//! Runtime configuration for the worker pool.
//!
//! These settings control the concurrency, buffering, and shutdown behavior
//! of a [`WorkerPool`](crate::WorkerPool). Each field is independently
//! tunable, allowing callers to trade backpressure responsiveness against
//! pipelining depth.

use core::time::Duration;

/// Pool construction parameters, validated at
/// [`WorkerPool::start`](crate::WorkerPool::start).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks executing submitted work concurrently.
    ///
    /// This is the pool's hard concurrency bound: at most `capacity` tasks
    /// ever execute at once. Must be at least 1.
    pub capacity: usize,

    /// Capacity of each worker's intake channel.
    ///
    /// Lower values increase backpressure responsiveness on `submit`; higher
    /// values enable deeper pipelining. A depth of 1 keeps at most one
    /// queued task per worker ahead of the one executing. Must be at
    /// least 1.
    pub intake_depth: usize,

    /// Capacity of the per-batch result channel between workers and the
    /// collector.
    ///
    /// This affects how many results can be buffered before a worker must
    /// wait for the collector to consume more data.
    pub outtake_depth: usize,

    /// Interval at which `drain` and `quiesce` re-check the pool's pending
    /// work counters.
    pub drain_poll_interval: Duration,

    /// Upper bound on how long `drain` waits for each worker to acknowledge
    /// shutdown, and on how long `quiesce` waits for in-flight work to reach
    /// a cancellation checkpoint.
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    /// A pool of `capacity` workers with default buffering and shutdown
    /// settings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            intake_depth: 1,
            outtake_depth: 8,
            drain_poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}
