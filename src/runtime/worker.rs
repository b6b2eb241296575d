//! Worker execution context for blocking work.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::error::{Error, Result};

/// Default number of blocking jobs allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Pool of threads for blocking computation.
///
/// Jobs run on tokio's blocking pool, at most `max_concurrent` at a time.
/// Completion is reported through a `Send` callback; getting back onto the
/// dispatch loop is the caller's business (see `AgentContext::defer_to_thread`).
#[derive(Clone)]
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl WorkerPool {
    /// Create a pool on the current tokio runtime.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("worker pool needs a tokio runtime: {}", e)))?;
        let max_concurrent = max_concurrent.max(1);

        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        })
    }

    /// Maximum number of concurrent jobs.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of job slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` off the dispatch loop and pass its outcome to `done`.
    ///
    /// `done` runs on a runtime thread, never on the dispatch loop. A
    /// panicking job is reported as `Error::Worker`.
    pub fn submit<T, W, D>(&self, work: W, done: D)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        D: FnOnce(Result<T>) + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);

        self.runtime.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => tokio::task::spawn_blocking(work)
                    .await
                    .map_err(|e| Error::Worker(e.to_string())),
                Err(e) => Err(Error::Worker(e.to_string())),
            };
            done(result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_submit_runs_off_caller_thread() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let caller = std::thread::current().id();

        pool.submit(
            move || (std::thread::current().id(), 2 + 2),
            move |result| {
                let _ = tx.send(result);
            },
        );

        let (worker, value) = rx.recv().await.unwrap().unwrap();
        assert_eq!(value, 4);
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn test_panicking_job_reports_error() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(
            || -> u32 { panic!("boom") },
            move |result| {
                let _ = tx.send(result);
            },
        );

        let result = rx.recv().await.unwrap();
        assert!(matches!(result, Err(Error::Worker(_))));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.max_concurrent(), 2);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            pool.submit(
                move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                },
                move |result| {
                    let _ = tx.send(result.is_ok());
                },
            );
        }

        for _ in 0..6 {
            assert!(rx.recv().await.unwrap());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(WorkerPool::new(1), Err(Error::Runtime(_))));
    }
}
