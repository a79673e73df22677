//! End-to-end pipeline tests against in-memory sockets.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use etherflood::flood::{self, FloodParams, FrameRequest};
use etherflood::frame::{
    derive_source, CodecError, EthernetCodec, EthernetFrame, FrameCodec, MacAddr,
};
use etherflood::link::LinkSocket;

/// Records the sequence index of every frame it is asked to send.
#[derive(Default)]
struct RecordingSocket {
    seen: Mutex<Vec<u32>>,
    fail_on: Option<u32>,
    /// Yield to the scheduler inside each write to interleave workers.
    yield_each: bool,
}

impl RecordingSocket {
    fn failing_on(index: u32) -> Self {
        Self {
            fail_on: Some(index),
            ..Self::default()
        }
    }

    fn indices(&self) -> Vec<u32> {
        let mut v = self.seen.lock().unwrap().clone();
        v.sort_unstable();
        v
    }
}

fn index_of(frame: &[u8]) -> u32 {
    let parsed = EthernetFrame::parse(frame).expect("valid frame");
    let o = parsed.source.octets();
    u32::from_be_bytes([o[2], o[3], o[4], o[5]])
}

#[async_trait]
impl LinkSocket for RecordingSocket {
    async fn write_to(&self, frame: &[u8], destination: MacAddr) -> io::Result<usize> {
        assert!(destination.is_broadcast());
        if self.yield_each {
            tokio::task::yield_now().await;
        }
        let index = index_of(frame);
        if self.fail_on == Some(index) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected failure"));
        }
        self.seen.lock().unwrap().push(index);
        Ok(frame.len())
    }
}

/// Counts writes and signals `notify` once `after` writes have happened.
struct TriggerSocket {
    writes: AtomicU64,
    after: u64,
    notify: Arc<Notify>,
}

#[async_trait]
impl LinkSocket for TriggerSocket {
    async fn write_to(&self, frame: &[u8], _destination: MacAddr) -> io::Result<usize> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.after {
            self.notify.notify_one();
        }
        tokio::task::yield_now().await;
        Ok(frame.len())
    }
}

/// Encodes normally except for one index.
struct FlakyCodec {
    inner: EthernetCodec,
    fail_on: u32,
}

impl FrameCodec for FlakyCodec {
    fn encode(&self, request: &FrameRequest) -> Result<Bytes, CodecError> {
        if request.index == self.fail_on {
            return Err(CodecError::PayloadTooLarge { len: 0, max: 0 });
        }
        self.inner.encode(request)
    }
}

/// 14-byte header + 50-byte payload.
fn codec_64() -> Arc<EthernetCodec> {
    Arc::new(EthernetCodec::new(0xbeef, 50))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_frames_two_workers() {
    let socket = Arc::new(RecordingSocket::default());
    let summary = flood::run(
        FloodParams::new(10, 2, 0),
        socket.clone(),
        codec_64(),
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(summary.frames_sent, 10);
    assert_eq!(summary.bytes_written, 640);
    assert_eq!(summary.frames_failed, 0);
    assert_eq!(summary.frames_issued, 10);
    assert_eq!(summary.workers, 2);
    assert!(!summary.interrupted);
    assert_eq!(socket.indices(), (1..=10).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counts_exact_and_each_request_consumed_once() {
    for &(frames, workers) in &[(0u32, 1usize), (1, 3), (257, 4), (2000, 16)] {
        let socket = Arc::new(RecordingSocket {
            yield_each: true,
            ..RecordingSocket::default()
        });
        let summary = flood::run(
            FloodParams::new(frames, workers, 42),
            socket.clone(),
            codec_64(),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.frames_sent, frames as u64, "N={} T={}", frames, workers);
        assert_eq!(summary.bytes_written, frames as u64 * 64);

        let seen = socket.indices();
        let unique: HashSet<u32> = seen.iter().copied().collect();
        assert_eq!(seen.len(), unique.len(), "a request was delivered twice");
        assert_eq!(seen, (1..=frames).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_terminates_for_all_pool_sizes() {
    for &workers in &[1usize, 4, 64] {
        for &frames in &[0u32, 1, 1000] {
            let socket = Arc::new(RecordingSocket::default());
            let run = flood::run(
                FloodParams::new(frames, workers, 1),
                socket,
                Arc::new(EthernetCodec::default()),
                std::future::pending(),
            );
            let summary = tokio::time::timeout(Duration::from_secs(10), run)
                .await
                .unwrap_or_else(|_| panic!("hung with N={} T={}", frames, workers))
                .unwrap();
            assert_eq!(summary.frames_sent, frames as u64);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_socket_failure_is_isolated() {
    let socket = Arc::new(RecordingSocket::failing_on(37));
    let summary = flood::run(
        FloodParams::new(100, 4, 0),
        socket.clone(),
        codec_64(),
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(summary.frames_sent, 99);
    assert_eq!(summary.frames_failed, 1);
    assert_eq!(summary.bytes_written, 99 * 64);
    assert!(!socket.indices().contains(&37));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_codec_failure_is_isolated() {
    let socket = Arc::new(RecordingSocket::default());
    let codec = Arc::new(FlakyCodec {
        inner: EthernetCodec::default(),
        fail_on: 1,
    });
    let summary = flood::run(
        FloodParams::new(20, 3, 0),
        socket.clone(),
        codec,
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(summary.frames_sent, 19);
    assert_eq!(summary.frames_failed, 1);
    assert_eq!(socket.indices(), (2..=20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_yields_consistent_partial_summary() {
    let notify = Arc::new(Notify::new());
    let socket = Arc::new(TriggerSocket {
        writes: AtomicU64::new(0),
        after: 10,
        notify: notify.clone(),
    });

    let shutdown = async move { notify.notified().await };
    let summary = flood::run(
        FloodParams::new(1_000_000, 2, 0),
        socket.clone(),
        Arc::new(EthernetCodec::default()),
        shutdown,
    )
    .await
    .unwrap();

    assert!(summary.interrupted);
    assert!(summary.frames_issued >= 10);
    assert!(summary.frames_issued < 1_000_000);
    // Everything issued before the interrupt is still drained and counted.
    assert_eq!(summary.frames_sent, summary.frames_issued as u64);
    assert_eq!(socket.writes.load(Ordering::SeqCst), summary.frames_sent);
}

#[tokio::test]
async fn test_socket_released_after_run() {
    let socket = Arc::new(RecordingSocket::default());
    flood::run(
        FloodParams::new(50, 8, 0),
        socket.clone(),
        codec_64(),
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(Arc::strong_count(&socket), 1);
}

#[tokio::test]
async fn test_zero_workers_rejected_before_start() {
    let socket = Arc::new(RecordingSocket::default());
    let result = flood::run(
        FloodParams::new(5, 0, 0),
        socket.clone(),
        codec_64(),
        std::future::pending(),
    )
    .await;

    assert!(result.is_err());
    assert!(socket.indices().is_empty());
}

#[test]
fn test_same_request_encodes_identically() {
    let codec = EthernetCodec::new(0xbeef, 0);
    let request = FrameRequest { index: 12345, seed: 200 };
    assert_eq!(codec.encode(&request).unwrap(), codec.encode(&request).unwrap());
    assert_eq!(
        EthernetFrame::parse(&codec.encode(&request).unwrap())
            .unwrap()
            .source,
        derive_source(200, 12345)
    );
}
