#![doc = include_str!("../README.md")]

mod collector;
mod config;
mod error;
mod orchestrator;
mod pool;
mod task;

pub use crate::collector::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::orchestrator::*;
pub use crate::pool::*;
pub use crate::task::*;
