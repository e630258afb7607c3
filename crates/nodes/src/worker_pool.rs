//! Bounded-concurrency executor for typed work items.
//!
//! All items of a batch are submitted up front and awaited together
//! (fan-out/fan-in). The pool is fail-fast: once an item fails, items that
//! have not yet acquired a slot are skipped, while items already running are
//! allowed to finish and keep their results.
//!
//! One pool is shared by every pipeline phase, so the concurrency bound
//! applies across phases and across concurrent pipelines.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One unit of work: an identifier for attribution plus the future to run.
pub struct WorkItem<T, E> {
    pub id: String,
    task: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> WorkItem<T, E> {
    pub fn new<F>(id: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            id: id.into(),
            task: task.boxed(),
        }
    }
}

/// A successful item result.
#[derive(Debug)]
pub struct WorkResult<T> {
    pub id: String,
    pub value: T,
}

/// The first failure of a batch.
#[derive(Debug)]
pub struct WorkFailure<E> {
    pub id: String,
    pub error: E,
}

/// Everything a batch produced.
#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    /// Successful results, in completion order.
    pub results: Vec<WorkResult<T>>,
    /// The first failure, if any. Later failures are logged only.
    pub first_error: Option<WorkFailure<E>>,
    /// Items never started because the batch had already failed.
    pub skipped: usize,
}

impl<T, E> BatchOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }
}

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    max_concurrency: usize,
}

impl WorkerPool {
    /// A pool running at most `max_concurrency` items at once (minimum one).
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs `items` with bounded concurrency.
    ///
    /// `on_progress(completed, total)` fires once per finished item (success or
    /// failure) with a strictly increasing `completed`.
    ///
    /// A panic inside an item is re-raised on the calling task.
    pub async fn process<T, E, P>(&self, items: Vec<WorkItem<T, E>>, on_progress: P) -> BatchOutcome<T, E>
    where
        T: Send + 'static,
        E: Send + std::fmt::Display + 'static,
        P: Fn(usize, usize),
    {
        let total = items.len();
        let stop = CancellationToken::new();
        let mut set = JoinSet::new();

        for item in items {
            let slots = Arc::clone(&self.slots);
            let stop = stop.clone();
            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = stop.cancelled() => None,
                    permit = slots.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return (item.id, None);
                };
                if stop.is_cancelled() {
                    return (item.id, None);
                }
                let result = item.task.await;
                (item.id, Some(result))
            });
        }

        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(total),
            first_error: None,
            skipped: 0,
        };
        let mut completed = 0;

        while let Some(joined) = set.join_next().await {
            let (id, result) = match joined {
                Ok(pair) => pair,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => continue,
            };
            match result {
                None => outcome.skipped += 1,
                Some(Ok(value)) => {
                    completed += 1;
                    on_progress(completed, total);
                    outcome.results.push(WorkResult { id, value });
                }
                Some(Err(error)) => {
                    completed += 1;
                    on_progress(completed, total);
                    if outcome.first_error.is_none() {
                        debug!(item = %id, error = %error, "work item failed; skipping unstarted items");
                        stop.cancel();
                        outcome.first_error = Some(WorkFailure { id, error });
                    } else {
                        debug!(item = %id, error = %error, "additional work item failure");
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_items_succeed_with_monotonic_progress() {
        let pool = WorkerPool::new(2);
        let items: Vec<WorkItem<usize, String>> = (0..5)
            .map(|i| WorkItem::new(format!("item-{i}"), async move { Ok(i * 10) }))
            .collect();
        let seen = parking_lot::Mutex::new(Vec::new());
        let outcome = pool
            .process(items, |done, total| seen.lock().push((done, total)))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.results.len(), 5);
        let seen = seen.into_inner();
        assert_eq!(seen, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let items: Vec<WorkItem<(), String>> = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                WorkItem::new(i.to_string(), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        let outcome = pool.process(items, |_, _| {}).await;
        assert_eq!(outcome.results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_in_flight_results() {
        let pool = WorkerPool::new(3);
        let items: Vec<WorkItem<&'static str, String>> = vec![
            WorkItem::new("a", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("a")
            }),
            WorkItem::new("b", async { Err("boom".to_string()) }),
            WorkItem::new("c", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("c")
            }),
        ];
        let outcome = pool.process(items, |_, _| {}).await;

        let failure = outcome.first_error.expect("failure reported");
        assert_eq!(failure.id, "b");
        let mut ids: Vec<_> = outcome.results.iter().map(|r| r.value).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_failure_skips_unstarted_items() {
        let pool = WorkerPool::new(1);
        let started = Arc::new(AtomicUsize::new(0));
        let mut items: Vec<WorkItem<(), String>> =
            vec![WorkItem::new("fail", async { Err("boom".to_string()) })];
        for i in 0..4 {
            let started = started.clone();
            items.push(WorkItem::new(i.to_string(), async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        let outcome = pool.process(items, |_, _| {}).await;
        assert!(outcome.first_error.is_some());
        assert_eq!(outcome.results.len() + outcome.skipped, 4);
        assert_eq!(started.load(Ordering::SeqCst), outcome.results.len());
    }
}
