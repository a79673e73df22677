//! Stats aggregator: the single consumer of write results.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::WriteResult;

/// Log progress every this many results.
const PROGRESS_INTERVAL: u64 = 1 << 16;

/// Running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub bytes_written: u64,
}

impl Tally {
    pub fn record(&mut self, result: &WriteResult) {
        match *result {
            WriteResult::Written { bytes, .. } => {
                self.frames_sent += 1;
                self.bytes_written += bytes as u64;
            }
            WriteResult::Failed { .. } => self.frames_failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.frames_sent + self.frames_failed
    }
}

/// Final totals plus the instant the stream ended.
#[derive(Debug, Clone, Copy)]
pub struct Aggregated {
    pub tally: Tally,
    pub finished_at: Instant,
}

/// Consume results until every sender is gone and the channel is drained.
pub async fn aggregate(mut results: mpsc::Receiver<WriteResult>) -> Aggregated {
    let mut tally = Tally::default();

    while let Some(result) = results.recv().await {
        tally.record(&result);
        trace!(index = result.index(), "result recorded");
        if tally.total() % PROGRESS_INTERVAL == 0 {
            debug!(
                frames_sent = tally.frames_sent,
                frames_failed = tally.frames_failed,
                bytes_written = tally.bytes_written,
                "flood progress"
            );
        }
    }

    Aggregated {
        tally,
        finished_at: Instant::now(),
    }
}
