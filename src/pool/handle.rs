use crate::error::TaskError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Flags shared between a queued job and its handle
#[derive(Default)]
pub(crate) struct TaskState {
    pub(crate) cancelled: AtomicBool,
    pub(crate) finished: AtomicBool,
}

/// Awaitable handle to a job submitted to the `WorkerPool`
///
/// Resolves to the job's output, or to a `TaskError` if the job was
/// cancelled, panicked or vanished. Dropping the handle does not stop the job.
pub struct TaskHandle<T> {
    id: usize,
    receiver: oneshot::Receiver<Result<T, TaskError>>,
    state: Arc<TaskState>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: usize,
        receiver: oneshot::Receiver<Result<T, TaskError>>,
        state: Arc<TaskState>,
    ) -> Self {
        Self { id, receiver, state }
    }

    /// Submission sequence number, unique within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Ask the pool not to start this job
    ///
    /// Only effective while the job is still queued; a running job always
    /// finishes. A cancelled job resolves to `TaskError::Cancelled`.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once the job has reported its result
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Dropped(id))),
            Poll::Pending => Poll::Pending,
        }
    }
}
