//! Session configuration.

use std::time::Duration;

use tabstream_protocol::TdsVersion;
use tabstream_protocol::packet::DEFAULT_PACKET_SIZE;

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    packet_size: usize,
    cancel_timeout: Duration,
    use_utc: bool,
    tds_version: TdsVersion,
}

impl SessionConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiated packet size in bytes (default 4096, clamped by the
    /// codec to 512..=32767).
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Set the negotiated packet size.
    #[must_use]
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.packet_size = size;
        self
    }

    /// How long to wait for the server to acknowledge an Attention
    /// signal before tearing the connection down (default 5s).
    #[must_use]
    pub fn cancel_timeout(&self) -> Duration {
        self.cancel_timeout
    }

    /// Set the cancel acknowledgment timeout.
    #[must_use]
    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    /// Whether timezone-aware values encode relative to UTC (default
    /// true).
    #[must_use]
    pub fn use_utc(&self) -> bool {
        self.use_utc
    }

    /// Set UTC handling for timezone-aware values.
    #[must_use]
    pub fn with_use_utc(mut self, use_utc: bool) -> Self {
        self.use_utc = use_utc;
        self
    }

    /// The TDS protocol version in effect (default 7.4).
    #[must_use]
    pub fn tds_version(&self) -> TdsVersion {
        self.tds_version
    }

    /// Set the TDS protocol version.
    #[must_use]
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            cancel_timeout: Duration::from_secs(5),
            use_utc: true,
            tds_version: TdsVersion::default(),
        }
    }
}
