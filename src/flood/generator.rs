//! Work generator: issues frame requests in index order.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::FrameRequest;

/// What the generator managed to hand off before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOutcome {
    pub issued: u32,
    pub interrupted: bool,
}

/// Push requests `1..=count` onto `queue`, waiting whenever it is full.
///
/// Stops early if `shutdown` resolves. The queue is closed on return by
/// dropping the sender, which tells every worker there is no more work.
pub async fn generate<F>(
    count: u32,
    seed: u8,
    queue: mpsc::Sender<FrameRequest>,
    shutdown: F,
) -> GeneratorOutcome
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut issued = 0u32;
    for index in 1..=count {
        let request = FrameRequest { index, seed };
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!(issued, remaining = count - issued, "interrupted, no more frames will be issued");
                return GeneratorOutcome { issued, interrupted: true };
            }
            sent = queue.send(request) => {
                if sent.is_err() {
                    // Only reachable if every worker died; the coordinator surfaces the panic.
                    error!(issued, "work queue closed with requests outstanding");
                    break;
                }
                issued = index;
            }
        }
    }

    debug!(issued, "all requests issued, closing work queue");
    GeneratorOutcome {
        issued,
        interrupted: false,
    }
}
