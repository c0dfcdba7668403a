//! Bounded worker pools
//!
//! A pool runs submitted futures on the tokio runtime with at most `workers`
//! of them executing at once. Submission never waits: every task is spawned
//! immediately and queues on the pool's semaphore until a worker slot frees
//! up, so the backlog is unbounded while concurrency is not.

use crate::PoolError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// How a pool shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every queued and running task finished before the deadline
    Drained,

    /// The deadline passed and the remaining tasks were aborted
    Cancelled { aborted: usize },
}

/// A fixed-concurrency pool of async workers
#[derive(Debug)]
pub struct WorkerPool {
    /// Pool name used in logs and errors
    name: &'static str,

    /// One permit per worker
    workers: Arc<Semaphore>,

    /// Spawned tasks; `None` once the pool stops accepting work
    tasks: Mutex<Option<JoinSet<()>>>,

    /// Tasks currently holding a worker permit
    running: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` tasks at once
    pub fn new(name: &'static str, workers: usize) -> Self {
        Self {
            name,
            workers: Arc::new(Semaphore::new(workers)),
            tasks: Mutex::new(Some(JoinSet::new())),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the pool name used in logs and errors
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueues a task for execution without waiting for a worker
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The task was queued
    /// * `Err(PoolError::Closed)` - The pool is shutting down; the task is
    ///   dropped without being polled
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.lock_tasks();
        let tasks = guard.as_mut().ok_or(PoolError::Closed(self.name))?;

        // Reap finished tasks so a long-lived pool does not accumulate results
        while let Some(finished) = tasks.try_join_next() {
            log_join_result(self.name, finished);
        }

        let workers = Arc::clone(&self.workers);
        let running = Arc::clone(&self.running);
        tasks.spawn(async move {
            // Queue for a worker slot
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            running.fetch_add(1, Ordering::SeqCst);
            let _running = RunningGuard(running);
            task.await;
        });

        Ok(())
    }

    /// Returns true while the pool accepts submissions
    pub fn is_accepting(&self) -> bool {
        self.lock_tasks().is_some()
    }

    /// Returns the number of tasks currently executing on a worker
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops accepting work, drains until `deadline`, then aborts the rest
    ///
    /// Calling this on a pool that is already shut down returns
    /// [`ShutdownOutcome::Drained`] immediately.
    pub async fn shutdown(&self, deadline: Instant) -> ShutdownOutcome {
        // Taking the set closes the pool to new submissions
        let Some(mut tasks) = self.lock_tasks().take() else {
            return ShutdownOutcome::Drained;
        };

        tracing::debug!("Draining {} pool ({} tasks)", self.name, tasks.len());

        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(finished) = tasks.join_next().await {
                log_join_result(self.name, finished);
            }
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::debug!("{} pool drained", self.name);
                ShutdownOutcome::Drained
            }
            Err(_) => {
                // Out of time: abort what is still queued or running
                let aborted = tasks.len();
                tracing::warn!(
                    "{} pool did not drain before the deadline, cancelling {} tasks",
                    self.name,
                    aborted
                );
                tasks.shutdown().await;
                ShutdownOutcome::Cancelled { aborted }
            }
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Option<JoinSet<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decrements the running count when a task finishes or is aborted
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn log_join_result(pool: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("Task in {} pool panicked: {}", pool, e);
        }
    }
}
