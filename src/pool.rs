//! Fixed-size worker pool over a shared task queue.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A task that did not complete, with the reason.
#[derive(Debug, Clone)]
pub struct TaskFailure<T> {
    pub task: T,
    pub error: String,
}

/// Outcome of a [`WorkerPool::run`] batch.
#[derive(Debug, Clone)]
pub struct PoolReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<TaskFailure<T>>,
    /// Tasks never started because the batch was cancelled.
    pub skipped: Vec<T>,
}

impl<T> Default for PoolReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> PoolReport<T> {
    fn merge(&mut self, other: PoolReport<T>) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs tasks on at most `concurrency` workers at once.
///
/// Every task is handed to exactly one worker and attempted once. A failing
/// (or panicking) task is recorded and the worker moves on; it never stops
/// the rest of the batch.
///
/// # Example
///
/// ```
/// use modsync::WorkerPool;
///
/// # #[tokio::main]
/// # async fn main() {
/// let report = WorkerPool::new(2)
///     .run(vec![1u32, 2, 3], |n| async move {
///         if n == 2 { Err("two") } else { Ok(()) }
///     })
///     .await;
/// assert_eq!(report.succeeded.len(), 2);
/// assert_eq!(report.failed.len(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    cancel: Option<CancellationToken>,
}

impl WorkerPool {
    /// A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: None,
        }
    }

    /// Stops handing out tasks once `token` is cancelled. Tasks already
    /// running are left to finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<T, E, F, Fut>(&self, tasks: Vec<T>, handler: F) -> PoolReport<T>
    where
        T: Display + Clone + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        if tasks.is_empty() {
            return PoolReport::default();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for task in tasks {
            // The receiver is alive until the workers below are joined.
            let _ = tx.send(task);
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(self.concurrency);

        for id in 0..self.concurrency {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let cancel = self.cancel.clone();

            workers.push(tokio::spawn(async move {
                let mut report = PoolReport::default();

                loop {
                    // Hold the lock only while taking the next task.
                    let next = queue.lock().await.recv().await;
                    let Some(task) = next else { break };

                    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                        debug!("Worker {}: skipping {} (cancelled)", id, task);
                        report.skipped.push(task);
                        continue;
                    }

                    match tokio::spawn((handler.as_ref())(task.clone())).await {
                        Ok(Ok(())) => {
                            debug!("Worker {}: finished {}", id, task);
                            report.succeeded.push(task);
                        }
                        Ok(Err(e)) => {
                            error!("Worker {}: {} failed: {}", id, task, e);
                            report.failed.push(TaskFailure {
                                task,
                                error: e.to_string(),
                            });
                        }
                        Err(e) => {
                            error!("Worker {}: {} aborted: {}", id, task, e);
                            report.failed.push(TaskFailure {
                                task,
                                error: format!("Task join error: {}", e),
                            });
                        }
                    }
                }

                report
            }));
        }

        let mut report = PoolReport::default();
        for worker in workers {
            match worker.await {
                Ok(partial) => report.merge(partial),
                Err(e) => error!("Worker join error: {}", e),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let pool = WorkerPool::new(3);
        let run = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                pool.run((0..10u32).collect(), move |_| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    let gate = Arc::clone(&gate);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        gate.acquire().await.map_err(|e| e.to_string())?.forget();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), String>(())
                    }
                })
                .await
            })
        };

        // Wait until the pool is saturated, then hold it there for a moment.
        tokio::time::timeout(Duration::from_secs(5), async {
            while in_flight.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(in_flight.load(Ordering::SeqCst), 3);

        gate.add_permits(10);
        let report = run.await.unwrap();

        assert_eq!(report.succeeded.len(), 10);
        assert!(report.failed.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let report = WorkerPool::new(2)
            .run(vec![1u32, 2, 3, 4, 5], |n| async move {
                if n == 3 {
                    Err(format!("task {} is broken", n))
                } else {
                    Ok(())
                }
            })
            .await;

        let mut ok = report.succeeded.clone();
        ok.sort();
        assert_eq!(ok, vec![1, 2, 4, 5]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].task, 3);
        assert_eq!(report.failed[0].error, "task 3 is broken");
    }

    #[tokio::test]
    async fn every_task_runs_exactly_once() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        let report = WorkerPool::new(4)
            .run((0..50u32).collect(), move |n| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(n);
                    Ok::<(), String>(())
                }
            })
            .await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
        assert_eq!(report.attempted(), 50);
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_failure() {
        let report = WorkerPool::new(1)
            .run(vec![1u32, 2], |n| async move {
                if n == 1 {
                    panic!("boom");
                }
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(report.succeeded, vec![2]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].task, 1);
    }

    #[tokio::test]
    async fn cancelled_pool_skips_remaining_tasks() {
        let token = CancellationToken::new();
        token.cancel();

        let report = WorkerPool::new(2)
            .with_cancellation(token)
            .run(vec![1u32, 2, 3], |_| async { Ok::<(), String>(()) })
            .await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.skipped.len(), 3);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.concurrency(), 1);

        let report = pool
            .run(vec![1u32], |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(report.succeeded, vec![1]);
    }

    #[tokio::test]
    async fn empty_batch_is_empty_report() {
        let report = WorkerPool::new(3)
            .run(Vec::<u32>::new(), |_| async { Ok::<(), String>(()) })
            .await;
        assert_eq!(report.attempted(), 0);
    }
}
