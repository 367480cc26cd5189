//! Outbound flow-control accounting.
//!
//! Each direction of credit is a [`FlowWindow`]: one for the connection,
//! one per stream. The ingress side adds credit when the peer sends
//! WINDOW_UPDATE (or adjusts it when SETTINGS change the initial window);
//! the egress engine reserves credit before emitting DATA. A DATA frame
//! consumes credit from both windows.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Largest legal window size per RFC 9113 Section 6.9.1.
pub const MAX_WINDOW_SIZE: i64 = (1 << 31) - 1;

/// Initial window size per RFC 9113.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

struct WindowState {
    /// Available credit. Signed: a SETTINGS decrease may drive an
    /// in-flight window temporarily negative.
    available: i64,
    aborted: bool,
    /// FIFO queue of waiting DATA writers.
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl WindowState {
    fn wake_one(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                break;
            }
        }
    }

    fn wake_all(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

/// A credit window shared between the ingress side and the egress engine.
#[derive(Clone)]
pub struct FlowWindow {
    inner: Arc<Mutex<WindowState>>,
}

/// Outcome of a credit reservation against both windows.
pub(crate) enum Credit {
    /// Reserved this many bytes from both windows.
    Available(usize),
    /// No credit on at least one window; wait for an update.
    Exhausted,
    /// At least one window was aborted.
    Aborted,
}

impl FlowWindow {
    /// Create a window with the given initial credit.
    pub fn new(initial: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WindowState {
                available: initial as i64,
                aborted: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Add credit (or remove it, for SETTINGS-driven shrinks).
    ///
    /// Returns false without applying the update when the resulting
    /// window would exceed 2^31-1; the caller escalates that to a
    /// connection-level flow-control error.
    pub fn try_update(&self, delta: i32) -> bool {
        let mut state = self.inner.lock().unwrap();
        let updated = state.available + delta as i64;
        if updated > MAX_WINDOW_SIZE {
            return false;
        }
        state.available = updated;
        if updated > 0 {
            state.wake_one();
        }
        true
    }

    /// Mark the window aborted and wake every waiter.
    pub fn abort(&self) {
        let mut state = self.inner.lock().unwrap();
        state.aborted = true;
        state.wake_all();
    }

    /// Whether the window has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().unwrap().aborted
    }

    /// Currently available credit.
    pub fn available(&self) -> i64 {
        self.inner.lock().unwrap().available
    }

    /// Register for a credit-or-abort signal.
    ///
    /// The returned receiver resolves as soon as credit is added or the
    /// window is aborted; if either is already true it resolves
    /// immediately, so registration cannot miss a wakeup.
    pub(crate) fn credit_or_abort(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.lock().unwrap();
        if state.aborted || state.available > 0 {
            let _ = tx.send(());
        } else {
            state.waiters.push_back(tx);
        }
        rx
    }
}

/// Atomically reserve `min(want, connection, stream)` credit from both
/// windows. Lock order is connection first, then stream.
pub(crate) fn reserve_pair(conn: &FlowWindow, stream: &FlowWindow, want: usize) -> Credit {
    let mut conn_state = conn.inner.lock().unwrap();
    let mut stream_state = stream.inner.lock().unwrap();

    if conn_state.aborted || stream_state.aborted {
        return Credit::Aborted;
    }

    let allowed = (want as i64)
        .min(conn_state.available)
        .min(stream_state.available)
        .max(0);
    if allowed == 0 {
        return Credit::Exhausted;
    }

    conn_state.available -= allowed;
    stream_state.available -= allowed;

    // Hand leftover credit to the next waiter in line.
    if conn_state.available > 0 {
        conn_state.wake_one();
    }
    if stream_state.available > 0 {
        stream_state.wake_one();
    }

    Credit::Available(allowed as usize)
}
