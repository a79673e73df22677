//! Sender worker: pulls requests, encodes, writes, reports.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use super::shutdown::WorkerGuard;
use super::{FailureStage, FrameRequest, WriteResult};
use crate::frame::{FrameCodec, MacAddr};
use crate::link::LinkSocket;

/// Per-worker counters, returned when the worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub written: u64,
    pub failed: u64,
}

/// Work queue shared by the pool. Each request goes to exactly one worker.
pub type WorkQueue = Arc<Mutex<mpsc::Receiver<FrameRequest>>>;

/// Drain `queue` until it is closed and empty.
///
/// Dropping `guard` on return marks this worker as exited.
pub async fn run<S, C>(
    id: usize,
    queue: WorkQueue,
    socket: Arc<S>,
    codec: Arc<C>,
    guard: WorkerGuard,
) -> WorkerReport
where
    S: LinkSocket + ?Sized,
    C: FrameCodec + ?Sized,
{
    let mut report = WorkerReport {
        id,
        written: 0,
        failed: 0,
    };

    loop {
        // The lock is released as soon as one request has been taken.
        let next = queue.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };

        let result = send_frame(socket.as_ref(), codec.as_ref(), request).await;
        match result {
            WriteResult::Written { .. } => report.written += 1,
            WriteResult::Failed { .. } => report.failed += 1,
        }
        guard.report(result).await;
    }

    debug!(
        worker = id,
        written = report.written,
        failed = report.failed,
        "worker exiting"
    );
    report
}

/// Encode and transmit a single frame. Never retries.
pub async fn send_frame<S, C>(socket: &S, codec: &C, request: FrameRequest) -> WriteResult
where
    S: LinkSocket + ?Sized,
    C: FrameCodec + ?Sized,
{
    let index = request.index;

    let frame = match codec.encode(&request) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(index, error = %e, "failed to encode frame");
            return WriteResult::Failed {
                index,
                stage: FailureStage::Codec,
            };
        }
    };

    match socket.write_to(&frame, MacAddr::BROADCAST).await {
        Ok(bytes) => {
            trace!(index, bytes, "frame written");
            WriteResult::Written { index, bytes }
        }
        Err(e) => {
            warn!(index, error = %e, "failed to write frame");
            WriteResult::Failed {
                index,
                stage: FailureStage::Socket,
            }
        }
    }
}
