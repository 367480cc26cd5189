//! HPACK-specific error types.

use thiserror::Error;

/// HPACK encoding errors.
#[derive(Debug, Error)]
pub enum HpackError {
    /// The output fragment is full. Internal signal; the block encoder
    /// retries the field in the next fragment.
    #[error("Output buffer full")]
    BufferFull,

    /// A single header field does not fit in an empty fragment. Fatal:
    /// the block cannot be completed.
    #[error("Header field too large for a single frame")]
    FieldTooLarge,
}
