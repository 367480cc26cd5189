//! Buffered byte sink feeding the connection transport.
//!
//! The sink is split in two halves so the engine's write lock never
//! covers IO: appends go to an in-memory buffer under the lock, and only
//! a flush touches the transport. Flushes drain in FIFO order because
//! the IO half lives behind its own fair mutex.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

/// Result of a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushResult {
    /// Bytes handed to the transport by this flush.
    pub bytes_flushed: u64,
    /// Whether the output is terminal: no further bytes will be written.
    pub completed: bool,
}

impl FlushResult {
    /// The terminal result returned by every operation once the engine
    /// has completed or aborted.
    pub fn terminal() -> Self {
        Self {
            bytes_flushed: 0,
            completed: true,
        }
    }

    /// A successful flush of `bytes_flushed` bytes.
    pub fn flushed(bytes_flushed: u64) -> Self {
        Self {
            bytes_flushed,
            completed: false,
        }
    }
}

impl Default for FlushResult {
    fn default() -> Self {
        Self::terminal()
    }
}

/// Cancellation signal carried by a flush.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a fresh, uncanceled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token, waking every waiter.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether the token has been tripped.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Wait until the token is tripped.
    pub async fn canceled(&self) {
        let mut notified = pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

/// In-memory buffer half of the sink. Mutated only under the engine's
/// write lock.
pub(crate) struct SinkBuffer {
    pending: BytesMut,
    reserved: Option<usize>,
    unflushed: u64,
    closed: bool,
}

impl SinkBuffer {
    pub(crate) fn new() -> Self {
        Self {
            pending: BytesMut::new(),
            reserved: None,
            unflushed: 0,
            closed: false,
        }
    }

    /// Append bytes. Silently dropped once the sink is closed.
    pub(crate) fn write(&mut self, bytes: &[u8]) {
        if self.closed {
            return;
        }
        self.pending.extend_from_slice(bytes);
        self.unflushed += bytes.len() as u64;
    }

    /// Reserve a writable span of exactly `n` bytes. The span is only
    /// kept by a matching [`advance`](Self::advance); an un-advanced
    /// reservation is discarded by the next write or reserve.
    pub(crate) fn reserve(&mut self, n: usize) -> &mut [u8] {
        self.roll_back_reservation();
        let start = self.pending.len();
        self.pending.resize(start + n, 0);
        self.reserved = Some(start);
        &mut self.pending[start..]
    }

    /// Commit `k` bytes of the current reservation.
    pub(crate) fn advance(&mut self, k: usize) {
        if let Some(start) = self.reserved.take() {
            self.pending.truncate(start + k);
            self.unflushed += k as u64;
        }
    }

    fn roll_back_reservation(&mut self) {
        if let Some(start) = self.reserved.take() {
            self.pending.truncate(start);
        }
    }

    /// Take everything buffered since the last flush, resetting the
    /// unflushed counter.
    pub(crate) fn take_pending(&mut self) -> (Bytes, u64) {
        self.roll_back_reservation();
        let count = self.unflushed;
        self.unflushed = 0;
        (self.pending.split().freeze(), count)
    }

    /// Bytes appended since the last flush.
    #[allow(dead_code)]
    pub(crate) fn unflushed(&self) -> u64 {
        self.unflushed
    }

    /// Close the buffer: drop pending bytes and ignore future appends.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.reserved = None;
        self.pending.clear();
        self.unflushed = 0;
    }
}

/// IO half of the sink: the transport plus terminal state. Lives behind
/// its own fair mutex so concurrent flushes drain in order.
pub(crate) struct SinkIo<S> {
    transport: Option<S>,
}

impl<S> SinkIo<S>
where
    S: AsyncWrite + Unpin,
{
    pub(crate) fn new(transport: S) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Write and flush one chunk. A closed transport reports success
    /// with nothing written; the caller already treats the engine as
    /// terminal by then.
    pub(crate) async fn flush_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };
        transport.write_all(chunk).await?;
        transport.flush().await
    }

    /// Drop the transport; all later flushes become no-ops.
    pub(crate) fn abort(&mut self) {
        self.transport = None;
    }
}
