//! Egress engine configuration.

use std::time::Duration;

use crate::frame::DEFAULT_MAX_FRAME_SIZE;

/// Default HPACK dynamic table size per RFC 7541.
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Minimum data rate enforced on flushes.
///
/// A flush of N bytes must complete within `grace + N / bytes_per_second`,
/// otherwise the connection is considered too slow and is aborted.
#[derive(Debug, Clone, Copy)]
pub struct MinDataRate {
    pub bytes_per_second: f64,
    pub grace: Duration,
}

impl MinDataRate {
    /// Create a new rate policy.
    pub fn new(bytes_per_second: f64, grace: Duration) -> Self {
        Self {
            bytes_per_second,
            grace,
        }
    }

    /// Time budget for flushing `bytes` bytes.
    pub fn budget_for(&self, bytes: u64) -> Duration {
        if self.bytes_per_second <= 0.0 {
            return Duration::MAX;
        }
        let transfer = Duration::from_secs_f64(bytes as f64 / self.bytes_per_second);
        self.grace.saturating_add(transfer)
    }
}

/// Configuration for a [`FrameWriter`](crate::FrameWriter).
#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Peer-advertised SETTINGS_MAX_FRAME_SIZE.
    pub max_frame_size: u32,
    /// Peer-advertised SETTINGS_HEADER_TABLE_SIZE.
    pub header_table_size: u32,
    /// Whether response header compression may use the HPACK tables.
    /// When disabled every field is sent literal-without-indexing.
    pub header_compression: bool,
    /// Minimum data rate enforced on flushes. None disables the watchdog.
    pub min_data_rate: Option<MinDataRate>,
    /// Yield to the scheduler after a DATA write that waited for credit,
    /// so application continuations do not run inline on the task that
    /// processed the peer's WINDOW_UPDATE. Tests disable this.
    pub yield_after_credit_wait: bool,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            header_compression: true,
            min_data_rate: None,
            yield_after_credit_wait: true,
        }
    }
}

/// Builder for [`EgressConfig`].
pub struct EgressConfigBuilder {
    config: EgressConfig,
}

impl EgressConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: EgressConfig::default(),
        }
    }

    /// Set the maximum frame size (SETTINGS_MAX_FRAME_SIZE).
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the HPACK dynamic table size (SETTINGS_HEADER_TABLE_SIZE).
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.config.header_table_size = size;
        self
    }

    /// Enable or disable response header compression.
    pub fn header_compression(mut self, enabled: bool) -> Self {
        self.config.header_compression = enabled;
        self
    }

    /// Set the minimum data rate enforced on flushes.
    pub fn min_data_rate(mut self, rate: MinDataRate) -> Self {
        self.config.min_data_rate = Some(rate);
        self
    }

    /// Enable or disable the scheduler yield after credit waits.
    pub fn yield_after_credit_wait(mut self, enabled: bool) -> Self {
        self.config.yield_after_credit_wait = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EgressConfig {
        self.config
    }
}

impl Default for EgressConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
