//! Link configuration.

use std::time::Duration;

use super::constants;

/// Tunable parameters for a link endpoint.
///
/// Defaults match the protocol's nominal values; the window size is
/// clamped into `1..=8` so the sender and receiver windows can never
/// overlap across a sequence-number wrap.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Sliding window size (1..=8).
    pub window_size: u8,

    /// Retransmission timeout for unacknowledged data frames.
    pub ack_timeout: Duration,

    /// Retransmissions attempted before a frame is declared failed.
    pub max_retries: u32,

    /// Interval between heartbeat probes while connected.
    pub heartbeat_interval: Duration,

    /// Maximum payload bytes per frame.
    pub max_data: usize,

    /// How long an unanswered connection request is left pending.
    pub connect_timeout: Duration,

    /// How long to wait for a disconnect confirmation.
    pub disconnect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            window_size: constants::DEFAULT_WINDOW,
            ack_timeout: constants::ACK_TIMEOUT,
            max_retries: constants::MAX_RETRIES,
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
            max_data: constants::MAX_DATA,
            connect_timeout: constants::CONNECT_TIMEOUT,
            disconnect_timeout: constants::DISCONNECT_TIMEOUT,
        }
    }
}

impl LinkConfig {
    /// Create a builder with default values.
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::new()
    }

    /// The heartbeat liveness horizon: a peer silent for this long is dead.
    pub fn heartbeat_liveness(&self) -> Duration {
        self.heartbeat_interval * constants::HEARTBEAT_LIVENESS_MULTIPLIER
    }
}

/// Builder for [`LinkConfig`].
#[derive(Debug, Clone)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self {
            config: LinkConfig::default(),
        }
    }

    /// Set the sliding window size. Values outside `1..=8` are clamped.
    pub fn window_size(mut self, size: u8) -> Self {
        self.config.window_size = size;
        self
    }

    /// Set the retransmission timeout.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set the retransmission budget.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the connection establishment timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the disconnect confirmation timeout.
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.disconnect_timeout = timeout;
        self
    }

    /// Build the configuration, clamping the window size into range.
    pub fn build(mut self) -> LinkConfig {
        self.config.window_size = self.config.window_size.clamp(1, constants::MAX_WINDOW);
        self.config
    }
}

impl Default for LinkConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
