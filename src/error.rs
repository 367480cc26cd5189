//! Error types for the h2-egress crate.

use std::io;

use crate::hpack::HpackError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while writing HTTP/2 frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HPACK encoding failed. The dynamic table may be out of sync with
    /// the peer, so the connection must be aborted.
    #[error("HPACK encoding error: {0}")]
    Hpack(#[from] HpackError),

    /// A flush did not complete within the minimum data rate budget.
    #[error("connection write did not satisfy the minimum data rate")]
    WriteTimeout,

    /// The connection output was aborted.
    #[error("connection aborted: {0}")]
    ConnectionAborted(String),

    /// IO error from the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a connection-aborted error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::ConnectionAborted(message.into())
    }
}
