//! Bounded worker pool
//!
//! A pool wraps one processing function and runs it for submitted payloads
//! with at most `size` runs in flight. Callers wait for a free slot and for
//! the result, up to a per-submission deadline.

use crate::TallyError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Boxed future returned by a pool's processing function
pub type ProcessFuture<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

type ProcessFn<P, R> = dyn Fn(P) -> ProcessFuture<R> + Send + Sync;

/// Runs a fixed processing function with bounded concurrency
///
/// A run that outlives its submission deadline is not cancelled: it keeps
/// its slot until it finishes, and `close` waits for it.
pub struct WorkerPool<P, R> {
    name: &'static str,
    size: usize,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    process: Arc<ProcessFn<P, R>>,
}

impl<P, R> WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Creates a pool of `size` workers running `process`
    ///
    /// A pool with zero workers is disabled: every submission is skipped.
    pub fn new<F, Fut>(name: &'static str, size: usize, process: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let process: Arc<ProcessFn<P, R>> =
            Arc::new(move |payload: P| -> ProcessFuture<R> { Box::pin(process(payload)) });

        Self {
            name,
            size,
            permits: Arc::new(Semaphore::new(size)),
            closed: AtomicBool::new(false),
            process,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Runs `payload` through the processing function
    ///
    /// Waits for a free worker, then for the run itself. Both waits share one
    /// deadline of `timeout`.
    ///
    /// # Errors
    ///
    /// * `PoolDisabled` - the pool has no workers
    /// * `PoolClosed` - `close` was called
    /// * `Timeout` - the deadline passed; `started` tells whether the run got a
    ///   worker (and keeps going in the background) or never ran
    /// * `Worker` - the run panicked
    pub async fn submit(&self, payload: P, timeout: Duration) -> Result<R, TallyError> {
        if self.size == 0 {
            return Err(TallyError::PoolDisabled(self.name));
        }
        if self.is_closed() {
            return Err(TallyError::PoolClosed(self.name));
        }

        let deadline = Instant::now() + timeout;

        let permit =
            match tokio::time::timeout_at(deadline, self.permits.clone().acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(TallyError::PoolClosed(self.name)),
                Err(_) => {
                    return Err(TallyError::Timeout {
                        after: timeout,
                        started: false,
                    })
                }
            };

        let work = (self.process)(payload);
        let handle = tokio::spawn(async move {
            let output = work.await;
            drop(permit);
            output
        });

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TallyError::Worker(format!("{} worker: {}", self.name, e))),
            Err(_) => {
                tracing::debug!(
                    "{} pool gave up waiting after {:?}, run continues in background",
                    self.name,
                    timeout
                );
                Err(TallyError::Timeout {
                    after: timeout,
                    started: true,
                })
            }
        }
    }

    /// Stops accepting submissions and waits for in-flight runs to finish
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if self.size > 0 {
            // Every in-flight run holds one permit until it returns
            let all = u32::try_from(self.size).unwrap_or(u32::MAX);
            let drained = self.permits.acquire_many(all).await;
            self.permits.close();
            drop(drained);
        }

        tracing::debug!("{} pool closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_submit_returns_process_output() {
        let pool = WorkerPool::new("double", 4, |n: u64| async move { n * 2 });

        let result = pool.submit(21, Duration::from_secs(1)).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_never_returning_process_times_out_after_deadline() {
        let pool = WorkerPool::new("stuck", 1, |_: ()| std::future::pending::<()>());

        let started = std::time::Instant::now();
        let result = pool.submit((), Duration::from_secs(1)).await;

        assert!(matches!(
            result,
            Err(TallyError::Timeout { started: true, .. })
        ));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_waiting_for_a_slot_times_out_without_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let pool = {
            let runs = runs.clone();
            Arc::new(WorkerPool::new("busy", 1, move |_: ()| {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500))
            }))
        };

        let holder = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit((), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiting = pool.submit((), Duration::from_millis(100)).await;
        let error = waiting.unwrap_err();
        assert!(matches!(error, TallyError::Timeout { started: false, .. }));
        assert!(error.is_unfinished_run());

        holder.await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_workers_skips_submission() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = {
            let calls = calls.clone();
            WorkerPool::new("disabled", 0, move |_: ()| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {}
            })
        };

        let result = pool.submit((), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TallyError::PoolDisabled("disabled"))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pool = {
            let running = running.clone();
            let peak = peak.clone();
            Arc::new(WorkerPool::new("bounded", 2, move |_: usize| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            }))
        };

        let mut submissions = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            submissions.push(tokio::spawn(async move {
                pool.submit(i, Duration::from_secs(5)).await
            }));
        }
        for submission in submissions {
            submission.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let pool = {
            let finished = finished.clone();
            Arc::new(WorkerPool::new("drain", 2, move |_: ()| {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    finished.store(true, Ordering::SeqCst);
                }
            }))
        };

        let in_flight = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit((), Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(in_flight.await.unwrap().is_ok());

        let late = pool.submit((), Duration::from_secs(1)).await;
        assert!(matches!(late, Err(TallyError::PoolClosed("drain"))));
    }

    #[tokio::test]
    async fn test_panicking_run_is_reported() {
        let pool = WorkerPool::new("panicky", 1, |_: ()| async {
            panic!("boom");
        });

        let result = pool.submit((), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TallyError::Worker(_))));

        // the slot is released even though the run panicked
        let result = pool.submit((), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TallyError::Worker(_))));
    }
}
