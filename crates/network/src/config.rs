//! Transport configuration.

use std::time::Duration;

/// Configuration for leader connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing a connection to a leader.
    pub connect_timeout: Duration,

    /// Timeout for writing one framed message.
    pub write_timeout: Duration,

    /// Largest frame accepted or produced, in bytes.
    pub max_frame_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(10),
            // Full batches of 20k transactions stay well below this.
            max_frame_length: 64 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
