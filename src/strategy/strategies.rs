//! Load Strategies
//!
//! Each strategy turns a list of sub-batches into a `Pending` value the
//! orchestrator can join.

use crate::{
    JoinSummary, SubBatch,
    batch::InsertTask,
    error::LoadError,
    pool::WorkerPool,
    store::RecordStore,
    strategy::Pending,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared resources every strategy dispatches against
#[derive(Clone)]
pub struct DispatchContext {
    pub store: Arc<RecordStore>,
    pub pool: Arc<WorkerPool>,
}

/// Loading strategy trait
///
/// Implementations decide how many sub-batches they want and how those
/// sub-batches reach the store.
#[async_trait]
pub trait LoadStrategy: Send + Sync {
    /// Returns the strategy name for logging
    fn name(&self) -> &'static str;

    /// Number of sub-batches to cut, given the configured partition count
    fn partitions(&self, configured: usize) -> usize;

    /// Start inserting every sub-batch
    ///
    /// # Returns
    /// A `Pending` value that resolves once every sub-batch has finished
    async fn dispatch(
        &self,
        ctx: &DispatchContext,
        batches: Vec<SubBatch>,
    ) -> Result<Pending, LoadError>;
}

/// Sequential strategy
///
/// Inserts the whole dataset in one call on the orchestrator's task. Any
/// insert error aborts the run.
pub struct SequentialStrategy;

#[async_trait]
impl LoadStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn partitions(&self, _configured: usize) -> usize {
        1
    }

    async fn dispatch(
        &self,
        ctx: &DispatchContext,
        batches: Vec<SubBatch>,
    ) -> Result<Pending, LoadError> {
        let mut summary = JoinSummary::default();
        for batch in batches {
            ctx.store.insert_batch(&batch.rows).await?;
            summary.record(true);
        }
        Ok(Pending::Completed(summary))
    }
}

/// Pooled concurrent strategy
///
/// Wraps every sub-batch in an `InsertTask` and submits it to the worker
/// pool. A task reporting `false` is counted as failed but does not abort
/// the run.
pub struct ConcurrentStrategy;

#[async_trait]
impl LoadStrategy for ConcurrentStrategy {
    fn name(&self) -> &'static str {
        "concurrent"
    }

    fn partitions(&self, configured: usize) -> usize {
        configured
    }

    async fn dispatch(
        &self,
        ctx: &DispatchContext,
        batches: Vec<SubBatch>,
    ) -> Result<Pending, LoadError> {
        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let task = InsertTask::new(batch, ctx.store.clone());
            let (index, rows) = (task.batch().index, task.batch().rows.len());
            let handle = ctx.pool.submit(task.run())?;
            debug!(sub_batch = index, rows, task = handle.id(), "Insert task submitted");
            handles.push(handle);
        }
        Ok(Pending::Tasks(handles))
    }
}

/// Future-based async strategy
///
/// Submits the store's insert future for each sub-batch and joins the
/// resulting futures. Insert errors travel through the futures; the run
/// fails once every future has resolved if any of them failed.
pub struct AsyncStrategy;

#[async_trait]
impl LoadStrategy for AsyncStrategy {
    fn name(&self) -> &'static str {
        "async"
    }

    fn partitions(&self, configured: usize) -> usize {
        configured
    }

    async fn dispatch(
        &self,
        ctx: &DispatchContext,
        batches: Vec<SubBatch>,
    ) -> Result<Pending, LoadError> {
        let mut futures = Vec::with_capacity(batches.len());
        for batch in batches {
            let store = ctx.store.clone();
            let index = batch.index;
            let handle = ctx.pool.submit(async move {
                for row in &batch.rows {
                    info!("Working data: {}, {}", row.first_name, row.last_name);
                }
                store.insert_batch(&batch.rows).await
            })?;
            debug!(sub_batch = index, task = handle.id(), "Async insert submitted");
            futures.push(handle);
        }
        Ok(Pending::Futures(futures))
    }
}

/// Strategy type enum for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    Sequential,
    Concurrent,
    Async,
}

impl StrategyType {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyType::Sequential => "sequential",
            StrategyType::Concurrent => "concurrent",
            StrategyType::Async => "async",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Factory function to create a strategy from its type
pub fn create_strategy(strategy_type: StrategyType) -> Box<dyn LoadStrategy> {
    match strategy_type {
        StrategyType::Sequential => Box::new(SequentialStrategy),
        StrategyType::Concurrent => Box::new(ConcurrentStrategy),
        StrategyType::Async => Box::new(AsyncStrategy),
    }
}
