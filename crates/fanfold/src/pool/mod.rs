//! Worker pool lifecycle and dispatch.
//!
//! ## Structure
//!
//! - `manager` - pool state machine, submission, drain, and cancellation.
//! - `worker` - the per-worker execution loop.

pub(crate) mod manager;
pub(crate) mod worker;

#[cfg(test)]
mod tests;

pub use manager::{Lifecycle, WorkerPool};
