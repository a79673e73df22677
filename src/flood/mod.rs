//! Concurrent frame flood pipeline.
//!
//! One generator feeds [`FrameRequest`]s into a bounded work queue drained by
//! a fixed pool of sender workers. Every write outcome is funnelled into a
//! single stats aggregator. The [`ShutdownCoordinator`] closes the stats
//! channel only once every worker has exited, so the [`Summary`] is read
//! after the last result has been counted.

pub mod generator;
pub mod report;
pub mod shutdown;
pub mod stats;
pub mod worker;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ConfigError;
use crate::frame::FrameCodec;
use crate::link::{LinkError, LinkSocket};

pub use shutdown::ShutdownCoordinator;

#[derive(Debug, Error)]
pub enum FloodError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// One unit of work: build and send frame `index` of a run seeded with `seed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest {
    /// 1-based sequence index.
    pub index: u32,
    pub seed: u8,
}

/// Where a failed request gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Codec,
    Socket,
}

/// Outcome of one request, handed from a worker to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Written { index: u32, bytes: usize },
    Failed { index: u32, stage: FailureStage },
}

impl WriteResult {
    pub fn index(&self) -> u32 {
        match *self {
            Self::Written { index, .. } | Self::Failed { index, .. } => index,
        }
    }
}

/// Validated run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodParams {
    pub frame_count: u32,
    pub workers: usize,
    pub seed: u8,
    /// Capacity of the work queue between generator and workers.
    pub queue_depth: usize,
}

impl FloodParams {
    pub fn new(frame_count: u32, workers: usize, seed: u8) -> Self {
        Self {
            frame_count,
            workers,
            seed,
            queue_depth: 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_pool(self.workers, self.queue_depth)
    }
}

/// Pool shape checks shared by [`FloodParams`] and the file config.
pub fn validate_pool(workers: usize, queue_depth: usize) -> Result<(), ConfigError> {
    if workers == 0 {
        return Err(ConfigError::NoWorkers);
    }
    if queue_depth == 0 {
        return Err(ConfigError::ZeroQueueDepth);
    }
    Ok(())
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub frames_requested: u32,
    /// Requests actually handed to the pool; lower than requested if interrupted.
    pub frames_issued: u32,
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub bytes_written: u64,
    pub workers: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl Summary {
    pub fn frames_per_sec(&self) -> f64 {
        rate(self.frames_sent as f64, self.elapsed)
    }

    pub fn throughput_mbps(&self) -> f64 {
        rate(self.bytes_written as f64 * 8.0, self.elapsed) / 1_000_000.0
    }
}

fn rate(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the flood to completion, or until `shutdown` resolves.
///
/// The pool is fully started before the first request is issued. Pass
/// `std::future::pending()` to disable interruption.
///
/// # Panics
///
/// Propagates any worker panic, and panics if the stats channel is closed
/// while workers are still running.
pub async fn run<S, C, F>(
    params: FloodParams,
    socket: Arc<S>,
    codec: Arc<C>,
    shutdown: F,
) -> Result<Summary, FloodError>
where
    S: LinkSocket + ?Sized + 'static,
    C: FrameCodec + ?Sized + 'static,
    F: Future<Output = ()>,
{
    params.validate()?;

    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    info!(
        run_id = %run_id,
        frames = params.frame_count,
        workers = params.workers,
        seed = params.seed,
        "starting flood"
    );

    let (work_tx, work_rx) = mpsc::channel(params.queue_depth);
    let (stats_tx, stats_rx) = mpsc::channel(params.workers);
    let work_rx = Arc::new(Mutex::new(work_rx));

    let aggregator = tokio::spawn(stats::aggregate(stats_rx));

    let mut coordinator = ShutdownCoordinator::new(stats_tx);
    for id in 0..params.workers {
        let guard = coordinator.register();
        coordinator.spawn(worker::run(
            id,
            work_rx.clone(),
            socket.clone(),
            codec.clone(),
            guard,
        ));
    }
    drop(work_rx);
    debug!(run_id = %run_id, workers = params.workers, "worker pool started");

    let start = Instant::now();
    let outcome = generator::generate(params.frame_count, params.seed, work_tx, shutdown).await;

    let reports = coordinator.wait_and_close().await;
    let aggregated = match aggregator.await {
        Ok(a) => a,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    };
    let elapsed = aggregated.finished_at.duration_since(start);
    let tally = aggregated.tally;

    debug_assert_eq!(
        reports.iter().map(|r| r.written).sum::<u64>(),
        tally.frames_sent
    );

    let summary = Summary {
        run_id,
        started_at,
        frames_requested: params.frame_count,
        frames_issued: outcome.issued,
        frames_sent: tally.frames_sent,
        frames_failed: tally.frames_failed,
        bytes_written: tally.bytes_written,
        workers: params.workers,
        elapsed,
        interrupted: outcome.interrupted,
    };

    info!(
        run_id = %run_id,
        frames_sent = summary.frames_sent,
        frames_failed = summary.frames_failed,
        bytes_written = summary.bytes_written,
        elapsed_sec = elapsed.as_secs_f64(),
        interrupted = summary.interrupted,
        "flood finished"
    );

    Ok(summary)
}
