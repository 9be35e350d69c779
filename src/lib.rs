//! This crate loads a batch of customer records into a relational table and
//! queries them back, using interchangeable sequential, pooled-concurrent and
//! future-async loading strategies over a shared, fixed-size worker pool.

pub mod types; // Defines the customer, name fragment and sub-batch data model.
pub mod error; // Error taxonomy for the store, partitioner, pool and runs.
pub mod store; // Transactional create/insert/query operations on the customers table.
pub mod pool; // Bounded worker pool and awaitable task handles.
pub mod strategy; // Sequential, concurrent and async loading strategies.
pub mod batch; // Partitioning, insert tasks and the run orchestrator.
pub mod config; // Defines and loads loader configuration.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use batch::Orchestrator;
