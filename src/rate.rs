//! Minimum-data-rate enforcement on flushes.
//!
//! Every flush reports how many bytes it is pushing; the watchdog grants
//! a time budget derived from the configured rate and cancels the write
//! when the budget runs out. Flow-control credit waits are never timed.

use std::io;
use std::time::Duration;

use tokio::io::AsyncWrite;

use crate::config::MinDataRate;
use crate::error::Error;
use crate::sink::{CancelToken, SinkIo};

/// Callback surface invoked when the rate watchdog trips.
///
/// The connection layer typically responds by tearing the whole
/// connection down; the engine aborts itself either way.
pub trait OutputAborter: Send + Sync {
    fn abort(&self, reason: Error);
}

/// How a watched flush ended.
pub(crate) enum FlushOutcome {
    Flushed,
    TimedOut,
    Canceled,
    Failed(io::Error),
}

/// Flush one chunk through the transport, bounded by the rate budget and
/// the optional cancellation token.
pub(crate) async fn flush_with_watchdog<S>(
    io: &mut SinkIo<S>,
    chunk: &[u8],
    rate: Option<MinDataRate>,
    cancel: Option<&CancelToken>,
) -> FlushOutcome
where
    S: AsyncWrite + Unpin,
{
    let budget = rate
        .map(|rate| rate.budget_for(chunk.len() as u64))
        .filter(|budget| *budget != Duration::MAX);

    let write = async {
        match budget {
            Some(budget) => match tokio::time::timeout(budget, io.flush_chunk(chunk)).await {
                Ok(Ok(())) => FlushOutcome::Flushed,
                Ok(Err(e)) => FlushOutcome::Failed(e),
                Err(_) => FlushOutcome::TimedOut,
            },
            None => match io.flush_chunk(chunk).await {
                Ok(()) => FlushOutcome::Flushed,
                Err(e) => FlushOutcome::Failed(e),
            },
        }
    };

    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.canceled() => FlushOutcome::Canceled,
                outcome = write => outcome,
            }
        }
        None => write.await,
    }
}
