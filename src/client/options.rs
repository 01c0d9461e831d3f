//! Client configuration.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::transport::Endpoint;

// ============================================================================
// Constants
// ============================================================================

/// Default port of the instrument server. Tried first.
pub const INSTRUMENT_PORT: u16 = 9003;

/// Default port of the simulator-side server. Tried on failover.
pub const SIMULATOR_PORT: u16 = 9002;

/// Delay before a reconnect attempt or a send-failure restart (5s).
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Host used when the caller asks for automatic host resolution.
const AUTO_HOST: &str = "localhost";

// ============================================================================
// ClientConfig
// ============================================================================

/// Configuration for a [`Client`].
///
/// Two candidate ports on one host are tried alternately across reconnect
/// attempts, starting with the primary.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use simlink::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.20")
///     .with_ports(9003, 9002)
///     .with_reconnect_delay(Duration::from_secs(5));
/// ```
///
/// [`Client`]: crate::Client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host of both candidate endpoints.
    pub host: String,
    /// Port tried first and after even numbers of failovers.
    pub primary_port: u16,
    /// Port tried after odd numbers of failovers.
    pub fallback_port: u16,
    /// Delay before reconnect attempts and send-failure restarts.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Creates a configuration for the given host with default ports.
    ///
    /// The literal host `"auto"` resolves to `localhost`; a browser-hosted
    /// deployment would substitute the page origin here instead.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let host = if host == "auto" {
            AUTO_HOST.to_string()
        } else {
            host
        };

        Self {
            host,
            primary_port: INSTRUMENT_PORT,
            fallback_port: SIMULATOR_PORT,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Creates a configuration with automatic host resolution.
    #[inline]
    #[must_use]
    pub fn auto() -> Self {
        Self::new("auto")
    }

    /// Sets the primary and fallback ports.
    #[inline]
    #[must_use]
    pub fn with_ports(mut self, primary: u16, fallback: u16) -> Self {
        self.primary_port = primary;
        self.fallback_port = fallback;
        self
    }

    /// Sets the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Returns the endpoint for the first connection attempt.
    #[inline]
    #[must_use]
    pub fn primary_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.primary_port)
    }

    /// Returns the candidate port other than `current`.
    ///
    /// Unknown ports (after a redirect moved the client elsewhere) flip
    /// back to the primary.
    #[inline]
    #[must_use]
    pub fn other_port(&self, current: u16) -> u16 {
        if current == self.primary_port {
            self.fallback_port
        } else {
            self.primary_port
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::auto()
    }
}

// ============================================================================
// Tests
// ============================================================================
