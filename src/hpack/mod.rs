//! HPACK header compression (RFC 7541), encode side only.
//!
//! The engine transmits response header blocks; it never decodes. The
//! block encoder hands out one frame-sized fragment at a time so the
//! coordinator can interleave the HEADERS/CONTINUATION framing.

mod dynamic_table;
mod encoder;
mod error;
mod integer;
mod static_table;

pub use encoder::{FieldCursor, HpackEncoder, STATUS_100_BLOCK};
pub use error::HpackError;
