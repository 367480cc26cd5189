//! Shared test plumbing: an in-memory recording transport and raw-frame
//! assertions over the bytes it captured.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use h2_egress::{EgressConfig, FrameHeader, FrameWriter, FRAME_HEADER_SIZE};

/// Shared view of everything a [`RecordingSink`] has written.
#[derive(Clone, Default)]
pub struct WireLog {
    bytes: Arc<Mutex<Vec<u8>>>,
}

/// One frame split out of the wire log.
pub struct RawFrame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl WireLog {
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    /// Split the captured bytes into frames. Panics on a malformed
    /// prefix or a truncated trailing frame, so every test doubles as a
    /// frame-boundary check.
    pub fn frames(&self) -> Vec<RawFrame> {
        let bytes = self.bytes();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let header = FrameHeader::parse(&bytes[offset..]).expect("valid frame header");
            let start = offset + FRAME_HEADER_SIZE;
            let end = start + header.length as usize;
            assert!(end <= bytes.len(), "truncated frame payload");
            frames.push(RawFrame {
                header,
                payload: bytes[start..end].to_vec(),
            });
            offset = end;
        }
        frames
    }
}

/// Transport that records writes into a [`WireLog`].
pub struct RecordingSink {
    log: WireLog,
}

impl AsyncWrite for RecordingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.log.bytes.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Transport that never accepts a byte. Used to pin down cancellation
/// and rate-watchdog behavior without races.
pub struct StalledSink;

impl AsyncWrite for StalledSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Build a writer over a recording transport.
pub fn recording_writer(config: EgressConfig) -> (FrameWriter<RecordingSink>, WireLog) {
    let log = WireLog::default();
    let sink = RecordingSink { log: log.clone() };
    (FrameWriter::new(sink, config), log)
}

/// Test configuration: scheduler hops disabled so suspended DATA writes
/// resume deterministically.
pub fn test_config() -> EgressConfig {
    let mut config = EgressConfig::default();
    config.yield_after_credit_wait = false;
    config
}
