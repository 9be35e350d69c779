//! Load Strategy Module
//!
//! This module implements the interchangeable ways of getting sub-batches into
//! the store, using the Strategy design pattern:
//! - Sequential: one synchronous insert on the calling task, no parallel dispatch
//! - Concurrent: one `InsertTask` per sub-batch on the shared worker pool
//! - Async: the store's insert future itself is submitted and joined as a future
//!
//! All three share the orchestrator's create -> partition -> dispatch -> join ->
//! query sequence and differ only in dispatch and join mechanics.

mod pending;
mod strategies;


pub use pending::Pending;
pub use strategies::{
    AsyncStrategy,
    ConcurrentStrategy,
    DispatchContext,
    LoadStrategy,
    SequentialStrategy,
    StrategyType,
    create_strategy,
};
