//! Error types for the loader
//!
//! Each layer has its own error enum:
//! - `StoreError`: schema, insert and query failures from the record store
//! - `PartitionError`: invalid split requests and malformed input names
//! - `TaskError` / `PoolError`: dispatcher-level failures of submitted work
//! - `LoadError`: what a strategy run reports back to the harness

use thiserror::Error;

/// Failure to turn a result row into a `Customer`
#[derive(Error, Debug)]
#[error("failed to decode column `{column}`: {source}")]
pub struct DecodeError {
    pub column: &'static str,
    #[source]
    pub source: sqlx::Error,
}

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not open the database
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// Table creation failed (dropping is never fatal)
    #[error("failed to create table: {0}")]
    Schema(#[source] sqlx::Error),

    /// One or more statements of a transport chunk failed; the whole batch was rolled back
    #[error("batch insert failed in chunk {chunk} with {} cause(s)", .causes.len())]
    BatchInsert { chunk: usize, causes: Vec<sqlx::Error> },

    /// Read failure
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Begin/commit failure
    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),
}

/// Partitioning and input errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("invalid partition request: {0}")]
    InvalidPartition(&'static str),

    #[error("malformed name {0:?}: expected \"First Last\"")]
    MalformedName(String),
}

/// Dispatcher-level failure of a single submitted task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task {0} was cancelled before it started")]
    Cancelled(usize),

    #[error("task {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    #[error("task {0} did not finish before the join deadline")]
    TimedOut(usize),

    /// The worker went away without reporting a result
    #[error("task {0} was dropped without a result")]
    Dropped(usize),
}

/// Worker pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool has been shut down")]
    ShutDown,
}

/// Errors that abort one strategy run
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Async inserts that failed after every future was resolved
    #[error("{failed} of {total} async inserts failed")]
    AsyncInsert { failed: usize, total: usize },
}
