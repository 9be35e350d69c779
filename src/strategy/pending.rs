use crate::{
    JoinSummary, UpdateCounts,
    error::{LoadError, StoreError, TaskError},
    pool::{TaskHandle, WorkerPool},
};
use futures::future::join_all;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Work dispatched by a strategy that has not been joined yet
pub enum Pending {
    /// Inserts already ran on the calling task
    Completed(JoinSummary),
    /// Insert tasks on the worker pool, each resolving to its success flag
    Tasks(Vec<TaskHandle<bool>>),
    /// Insert futures on the worker pool, each resolving to the store's result
    Futures(Vec<TaskHandle<Result<UpdateCounts, StoreError>>>),
}

impl Pending {
    /// Number of dispatched sub-batches still to be joined
    pub fn len(&self) -> usize {
        match self {
            Pending::Completed(_) => 0,
            Pending::Tasks(handles) => handles.len(),
            Pending::Futures(handles) => handles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until every dispatched sub-batch has finished
    ///
    /// - `Tasks`: joined through the pool in submission order. `false`
    ///   outcomes are counted as failures; a `TaskError` fails the join after
    ///   every handle has been awaited.
    /// - `Futures`: all futures are resolved together and every failure is
    ///   collected; if any failed the join returns `LoadError::AsyncInsert`.
    pub async fn join(self, timeout: Option<Duration>) -> Result<JoinSummary, LoadError> {
        match self {
            Pending::Completed(summary) => Ok(summary),

            Pending::Tasks(handles) => {
                let outcomes = match timeout {
                    Some(timeout) => WorkerPool::join_all_within(handles, timeout).await?,
                    None => WorkerPool::join_all(handles).await?,
                };

                let mut summary = JoinSummary::default();
                for (index, inserted) in outcomes.into_iter().enumerate() {
                    if !inserted {
                        warn!(sub_batch = index, "Sub-batch was not inserted");
                    }
                    summary.record(inserted);
                }
                Ok(summary)
            }

            Pending::Futures(handles) => {
                let total = handles.len();
                let resolved = resolve_all(handles, timeout).await;

                let mut summary = JoinSummary::default();
                for (index, result) in resolved.into_iter().enumerate() {
                    match result {
                        Ok(Ok(counts)) => {
                            debug!(sub_batch = index, "Update counts: {:?}", counts);
                            summary.record(true);
                        }
                        Ok(Err(e)) => {
                            error!(sub_batch = index, "Async insert failed: {}", e);
                            summary.record(false);
                        }
                        Err(e) => {
                            error!(sub_batch = index, "Async insert did not complete: {}", e);
                            summary.record(false);
                        }
                    }
                }

                if summary.failed > 0 {
                    return Err(LoadError::AsyncInsert {
                        failed: summary.failed,
                        total,
                    });
                }
                Ok(summary)
            }
        }
    }
}

/// Await every handle concurrently, optionally bounded by a shared deadline
async fn resolve_all<T>(
    handles: Vec<TaskHandle<T>>,
    timeout: Option<Duration>,
) -> Vec<Result<T, TaskError>> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);

    join_all(handles.into_iter().map(move |mut handle| async move {
        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    handle.cancel();
                    Err(TaskError::TimedOut(handle.id()))
                }
            },
            None => handle.await,
        }
    }))
    .await
}
