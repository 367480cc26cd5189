//! # h2-egress
//!
//! Outbound framing engine for an HTTP/2 server connection.
//!
//! The engine serializes response headers, trailers, body data, and
//! control frames onto one multiplexed transport, obeying both
//! flow-control windows, fragmenting by the negotiated maximum frame
//! size, and enforcing a minimum-data-rate contract on flushes. The
//! ingress side of the connection feeds it stream lifecycle events,
//! window updates, and SETTINGS-derived limits.

// Core modules
pub mod config;
pub mod error;
pub mod flow;
pub mod frame;
pub mod hpack;

// Write path
pub mod rate;
pub mod sink;
pub mod writer;

// Re-exports for convenient access
pub use config::{EgressConfig, EgressConfigBuilder, MinDataRate};
pub use error::{Error, Result};
pub use flow::{FlowWindow, DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};
pub use frame::{flags, ErrorCode, FrameHeader, FrameType, SettingsId, FRAME_HEADER_SIZE};
pub use hpack::{HpackEncoder, HpackError};
pub use rate::OutputAborter;
pub use sink::{CancelToken, FlushResult};
pub use writer::FrameWriter;
