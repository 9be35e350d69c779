//! Worker Pool Module
//!
//! A fixed number of worker tasks pulling jobs from one shared FIFO queue.
//! Jobs are submitted without blocking and observed through `TaskHandle`s;
//! the orchestrator's only suspension point is joining those handles.

use crate::error::{PoolError, TaskError};
use crate::pool::handle::{TaskHandle, TaskState};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Bounded pool of reusable workers
///
/// Created once per process and shared by reference (`Arc`) with every
/// strategy. At most `size` jobs run at the same time; the rest wait in the
/// queue in submission order.
pub struct WorkerPool {
    size: usize,
    /// `None` once the pool has been shut down
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Submitted jobs that have not reported a result yet
    outstanding: Arc<AtomicUsize>,
    next_id: AtomicUsize,
}

impl WorkerPool {
    /// Spawn `size` workers on the current tokio runtime
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers: Vec<JoinHandle<()>> = (0..size)
            .map(|worker_id| tokio::spawn(Self::worker(worker_id, receiver.clone())))
            .collect();

        info!(size, "Worker pool started");

        Self {
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            outstanding: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(0),
        }
    }

    async fn worker(
        worker_id: usize,
        receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    ) {
        loop {
            let job = {
                let mut rx = receiver.lock().await;
                rx.recv().await
            };

            match job {
                Some(job) => job.await,
                None => {
                    debug!(worker_id, "Job queue closed, worker exiting");
                    return;
                }
            }
        }
    }

    /// Queue `future` for execution and return a handle to its result
    ///
    /// Never blocks: the queue is unbounded, so any number of sub-batches can
    /// be submitted before the first one is joined.
    pub fn submit<F, T>(&self, future: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (result_tx, result_rx) = oneshot::channel();
        let state = Arc::new(TaskState::default());

        let job_state = state.clone();
        let outstanding = self.outstanding.clone();
        let job: Job = Box::pin(async move {
            let outcome = if job_state.cancelled.load(Ordering::SeqCst) {
                debug!(task = id, "Task cancelled before start");
                Err(TaskError::Cancelled(id))
            } else {
                AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .map_err(|payload| TaskError::Panicked {
                        id,
                        message: panic_message(payload.as_ref()),
                    })
            };

            job_state.finished.store(true, Ordering::SeqCst);
            outstanding.fetch_sub(1, Ordering::SeqCst);
            // The handle may already be gone; the job still ran to completion
            let _ = result_tx.send(outcome);
        });

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(PoolError::ShutDown)?;

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::ShutDown);
        }

        debug!(task = id, "Task submitted");
        Ok(TaskHandle::new(id, result_rx, state))
    }

    /// Wait for every handle, in submission order
    ///
    /// A failing handle does not stop the join: all handles are awaited
    /// first, then the first error (if any) is returned.
    pub async fn join_all<T>(handles: Vec<TaskHandle<T>>) -> Result<Vec<T>, TaskError> {
        Self::join(handles, None).await
    }

    /// Like `join_all`, but handles still pending at `timeout` are cancelled
    /// and reported as `TaskError::TimedOut`
    pub async fn join_all_within<T>(
        handles: Vec<TaskHandle<T>>,
        timeout: Duration,
    ) -> Result<Vec<T>, TaskError> {
        Self::join(handles, Some(Instant::now() + timeout)).await
    }

    async fn join<T>(
        handles: Vec<TaskHandle<T>>,
        deadline: Option<Instant>,
    ) -> Result<Vec<T>, TaskError> {
        let total = handles.len();
        let mut outputs = Vec::with_capacity(total);
        let mut first_error = None;

        for mut handle in handles {
            let id = handle.id();
            let outcome = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        handle.cancel();
                        Err(TaskError::TimedOut(id))
                    }
                },
                None => handle.await,
            };

            match outcome {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    warn!(task = id, "Task failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(total, joined = outputs.len(), "Join complete");

        match first_error {
            Some(e) => Err(e),
            None => Ok(outputs),
        }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs submitted but not yet finished
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Shut the pool down only if no job is outstanding
    ///
    /// # Returns
    /// `true` if the pool was shut down, `false` if work was still in flight
    pub async fn shutdown_if_idle(&self) -> bool {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "Tasks still active, leaving worker pool running");
            return false;
        }
        self.shutdown().await;
        true
    }

    /// Close the queue and wait for the workers to drain it and exit
    pub async fn shutdown(&self) {
        // Dropping the sender closes the queue once the queued jobs are consumed
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Worker exited abnormally: {}", e);
            }
        }

        info!("Worker pool shut down");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
