//! Worker Pool Module
//!
//! This module provides the bounded worker pool shared by the concurrent and
//! async strategies:
//! - WorkerPool: fixed set of workers servicing a FIFO job queue
//! - TaskHandle: awaitable, cancellable reference to one submitted job

mod handle;
mod worker_pool;

pub use handle::TaskHandle;
pub use worker_pool::WorkerPool;
