//! Batch Loading Module
//!
//! This module handles the batch side of a load run:
//! - Partitioner: Cuts the dataset into contiguous sub-batches
//! - InsertTask: Inserts one sub-batch, reporting success instead of erroring
//! - Orchestrator: Drives a strategy through the run state machine

mod partition;
mod task;
pub mod orchestrator;

pub use partition::{partition, partition_by_size};
pub use task::InsertTask;
pub use orchestrator::{Orchestrator, RunReport, RunState};
