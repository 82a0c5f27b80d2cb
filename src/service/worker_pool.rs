//! Bounded worker pool for blocking handler work.
//!
//! [`WorkerPool`] runs jobs on tokio's blocking thread pool, gated by a fair
//! [`Semaphore`] holding `max_workers` permits. Queued jobs acquire permits
//! in submission order. The permit moves into the blocking closure, so a
//! running job keeps its slot until it returns even if whoever submitted
//! it has gone away.
//!
//! Every job is tracked by a [`TaskTracker`]; [`WorkerPool::drain_and_stop`]
//! closes the tracker and waits for it to empty.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::task::TaskTracker;

use crate::error::{GatewayError, HandlerError};

/// Shared pool of worker slots.
///
/// Cheap to clone; all clones share the same slots and tracker.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    max_workers: usize,
}

impl WorkerPool {
    /// Creates a pool that runs at most `max_workers` jobs at once.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if `max_workers` is zero.
    pub fn new(max_workers: usize) -> Result<Self, GatewayError> {
        if max_workers == 0 {
            return Err(GatewayError::Config(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            max_workers,
        })
    }

    /// Submits a blocking job and returns a handle to its result.
    ///
    /// Never waits for a free slot; the job queues inside the pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ExecutorStopped`] once
    /// [`WorkerPool::drain_and_stop`] has been called.
    pub fn submit<F, T>(&self, job: F) -> Result<TaskHandle<T>, GatewayError>
    where
        F: FnOnce() -> Result<T, HandlerError> + Send + 'static,
        T: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(GatewayError::ExecutorStopped);
        }

        let permits = Arc::clone(&self.permits);
        let tracker = self.tracker.clone();
        let inner = self.tracker.spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| HandlerError::Cancelled)?;
            let joined = tracker
                .spawn_blocking(move || {
                    let _permit = permit;
                    job()
                })
                .await;
            joined.unwrap_or_else(|err| Err(join_failure(err)))
        });

        Ok(TaskHandle { inner })
    }

    /// Stops accepting jobs and waits for every queued and running job to
    /// finish.
    pub async fn drain_and_stop(&self) {
        self.tracker.close();
        tracing::info!(pending = self.tracker.len(), "draining worker pool");
        self.tracker.wait().await;
        tracing::info!("worker pool drained");
    }

    /// Returns `true` once the pool no longer accepts jobs.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Configured number of worker slots.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of slots currently held by running jobs.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.max_workers
            .saturating_sub(self.permits.available_permits())
    }
}

/// Pending result of a job submitted to a [`WorkerPool`].
///
/// Resolves to the job's own result, or to [`HandlerError::Panicked`] /
/// [`HandlerError::Cancelled`] if the job never returned. Dropping the
/// handle detaches the job; it still runs.
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T, HandlerError>>,
}

impl<T> TaskHandle<T> {
    /// Cancels the job if it is still waiting for a slot.
    ///
    /// A job that already started runs to completion on its worker thread.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Returns a handle that can cancel the job without owning its result.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.inner.abort_handle()
    }

    /// Returns `true` if the job has produced its result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, HandlerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|err| Err(join_failure(err))))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.inner.is_finished())
            .finish()
    }
}

fn join_failure(err: JoinError) -> HandlerError {
    if err.is_panic() {
        HandlerError::Panicked(panic_message(err.into_panic().as_ref()))
    } else {
        HandlerError::Cancelled
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
