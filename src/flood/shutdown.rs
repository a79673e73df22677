//! Worker lifetime tracking and ordered stats-channel closure.
//!
//! Each worker holds a [`WorkerGuard`] which owns its handle to the stats
//! channel. A worker can only report while its guard is alive, and the
//! coordinator refuses to close the channel while any guard is still live.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use super::worker::WorkerReport;
use super::WriteResult;

#[derive(Debug, Default)]
struct PoolState {
    live: AtomicUsize,
    stats_closed: AtomicBool,
}

/// Supervises the worker pool and owns the last stats sender.
pub struct ShutdownCoordinator {
    state: Arc<PoolState>,
    stats_tx: Option<mpsc::Sender<WriteResult>>,
    workers: JoinSet<WorkerReport>,
}

impl ShutdownCoordinator {
    pub fn new(stats_tx: mpsc::Sender<WriteResult>) -> Self {
        Self {
            state: Arc::new(PoolState::default()),
            stats_tx: Some(stats_tx),
            workers: JoinSet::new(),
        }
    }

    /// Count a new worker as live and hand it a stats sender.
    ///
    /// # Panics
    ///
    /// If the stats channel has already been closed.
    pub fn register(&self) -> WorkerGuard {
        let stats_tx = match &self.stats_tx {
            Some(tx) if !self.state.stats_closed.load(Ordering::Acquire) => tx.clone(),
            _ => panic!("worker registered after the stats channel was closed"),
        };
        self.state.live.fetch_add(1, Ordering::AcqRel);
        WorkerGuard {
            state: self.state.clone(),
            stats_tx,
        }
    }

    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = WorkerReport> + Send + 'static,
    {
        self.workers.spawn(worker);
    }

    /// Workers that have registered and not yet exited.
    pub fn live_workers(&self) -> usize {
        self.state.live.load(Ordering::Acquire)
    }

    /// Close the coordinator's stats sender.
    ///
    /// Once every guard is gone this is the last sender, so the aggregator
    /// sees end-of-stream after draining what is already queued.
    ///
    /// # Panics
    ///
    /// If any worker is still live.
    pub fn close_stats(&mut self) {
        let live = self.live_workers();
        if live != 0 {
            panic!("stats channel closed with {} worker(s) still live", live);
        }
        self.state.stats_closed.store(true, Ordering::Release);
        self.stats_tx = None;
        debug!("stats channel closed");
    }

    /// Join every spawned worker, then close the stats channel.
    ///
    /// A panicking worker is re-raised here.
    pub async fn wait_and_close(mut self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.workers.len());
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => panic!("worker task cancelled: {}", e),
            }
        }
        debug!(workers = reports.len(), "all workers exited");

        self.close_stats();
        reports
    }
}

/// Proof that a worker is live; dropping it records the worker's exit.
pub struct WorkerGuard {
    state: Arc<PoolState>,
    stats_tx: mpsc::Sender<WriteResult>,
}

impl WorkerGuard {
    /// Hand one result to the aggregator, waiting if it is behind.
    ///
    /// # Panics
    ///
    /// If the aggregator is gone, meaning shutdown ordering was violated.
    pub async fn report(&self, result: WriteResult) {
        assert!(
            !self.state.stats_closed.load(Ordering::Acquire),
            "stats write after the channel was closed"
        );
        if self.stats_tx.send(result).await.is_err() {
            panic!("stats receiver dropped while worker still running");
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.state.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_after_all_guards_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut coordinator = ShutdownCoordinator::new(tx);

        let a = coordinator.register();
        let b = coordinator.register();
        assert_eq!(coordinator.live_workers(), 2);

        a.report(WriteResult::Written { index: 1, bytes: 60 }).await;
        drop(a);
        drop(b);
        assert_eq!(coordinator.live_workers(), 0);

        coordinator.close_stats();
        assert_eq!(
            rx.recv().await,
            Some(WriteResult::Written { index: 1, bytes: 60 })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    #[should_panic(expected = "still live")]
    async fn test_close_with_live_worker_panics() {
        let (tx, _rx) = mpsc::channel(1);
        let mut coordinator = ShutdownCoordinator::new(tx);
        let _guard = coordinator.register();
        coordinator.close_stats();
    }

    #[tokio::test]
    #[should_panic(expected = "after the stats channel was closed")]
    async fn test_register_after_close_panics() {
        let (tx, _rx) = mpsc::channel(1);
        let mut coordinator = ShutdownCoordinator::new(tx);
        coordinator.close_stats();
        let _ = coordinator.register();
    }

    #[tokio::test]
    #[should_panic(expected = "stats receiver dropped")]
    async fn test_report_without_aggregator_panics() {
        let (tx, rx) = mpsc::channel(1);
        let coordinator = ShutdownCoordinator::new(tx);
        let guard = coordinator.register();
        drop(rx);
        guard
            .report(WriteResult::Written { index: 1, bytes: 1 })
            .await;
    }

    #[tokio::test]
    async fn test_wait_and_close_joins_workers() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut coordinator = ShutdownCoordinator::new(tx);
        for id in 0..3 {
            let guard = coordinator.register();
            coordinator.spawn(async move {
                guard
                    .report(WriteResult::Written {
                        index: id as u32 + 1,
                        bytes: 10,
                    })
                    .await;
                WorkerReport {
                    id,
                    written: 1,
                    failed: 0,
                }
            });
        }

        let reports = coordinator.wait_and_close().await;
        assert_eq!(reports.len(), 3);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }

    async fn exploding_worker(guard: WorkerGuard) -> WorkerReport {
        let _guard = guard;
        panic!("boom")
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn test_worker_panic_propagates() {
        let (tx, _rx) = mpsc::channel(1);
        let mut coordinator = ShutdownCoordinator::new(tx);
        let guard = coordinator.register();
        coordinator.spawn(exploding_worker(guard));
        coordinator.wait_and_close().await;
    }
}
