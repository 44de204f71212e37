//! Bounded, order-preserving fan-out.
//!
//! [`run_all`] spawns one task per input on a `JoinSet`, gated by a semaphore so at most
//! `limit` tasks are in flight. Each task carries its input index and its output is written
//! to that slot, so the returned vector matches input order regardless of completion order.

use anyhow::{Context, anyhow};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `worker` over every item with at most `limit` concurrent tasks.
///
/// Waits for every dispatched task before returning. Workers are expected to report their own
/// failures in their output; a worker that panics is an internal error and fails the batch.
/// A `limit` of zero is treated as one.
pub async fn run_all<I, O, F, Fut>(items: Vec<I>, limit: usize, worker: F) -> anyhow::Result<Vec<O>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let worker = Arc::new(worker);
    let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    let mut join_set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        // Blocks while `limit` tasks hold permits
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("concurrency gate closed")?;

        let worker = Arc::clone(&worker);
        join_set.spawn(async move {
            let _permit = permit;
            (index, worker(item).await)
        });

        while let Some(joined) = join_set.try_join_next() {
            let (index, output) = joined.context("probe task failed")?;
            slots[index] = Some(output);
        }
    }

    while let Some(joined) = join_set.join_next().await {
        let (index, output) = joined.context("probe task failed")?;
        slots[index] = Some(output);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| anyhow!("no result recorded for item {index}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many workers are running at once.
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_is_respected_and_order_preserved() {
        let tracker = Arc::new(InFlight::default());
        let items: Vec<u64> = (0..12).collect();

        let worker_tracker = Arc::clone(&tracker);
        let results = run_all(items, 5, move |i| {
            let tracker = Arc::clone(&worker_tracker);
            async move {
                tracker.enter();
                // Earlier items take longer, so completion order is reversed within a wave
                tokio::time::sleep(Duration::from_millis(100 * (12 - i))).await;
                tracker.exit();
                i * 10
            }
        })
        .await
        .unwrap();

        assert_eq!(results, (0..12).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.started.load(Ordering::SeqCst), 12);
        assert_eq!(tracker.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fewer_items_than_limit() {
        let tracker = Arc::new(InFlight::default());
        let worker_tracker = Arc::clone(&tracker);

        let results = run_all(vec!["a", "b"], 5, move |s| {
            let tracker = Arc::clone(&worker_tracker);
            async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis(10)).await;
                tracker.exit();
                s.to_uppercase()
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> = run_all(Vec::<u32>::new(), 5, |i| async move { i }).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_runs_sequentially() {
        let tracker = Arc::new(InFlight::default());
        let worker_tracker = Arc::clone(&tracker);

        let results = run_all(vec![3u64, 1, 2], 0, move |i| {
            let tracker = Arc::clone(&worker_tracker);
            async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis(i)).await;
                tracker.exit();
                i
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![3, 1, 2]);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_the_batch() {
        let result = run_all(vec![1, 2, 3], 2, |i| async move {
            if i == 2 {
                panic!("worker exploded");
            }
            i
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("probe task failed"));
    }
}
