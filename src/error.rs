//! Error types for the instrument link client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use simlink::{Client, DatarefType, Result};
//!
//! fn example(client: &Client) -> Result<()> {
//!     client.set_dataref("sim/cockpit/electrical/landing_lights_on", DatarefType::Int, 1.0)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Programmer faults | [`Error::MissingIdentifier`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ClientClosed`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Programmer Faults
    // ========================================================================
    /// Outbound message built before the handshake assigned a session
    /// identifier.
    ///
    /// Every message sent to the instrument server must carry the session
    /// identifier issued during the handshake. Hitting this error means the
    /// caller invoked the client before the ready callback fired (or after
    /// a reconnect invalidated the session).
    #[error("No session identifier: message built before handshake completed")]
    MissingIdentifier,

    /// Invalid argument passed to a client operation.
    ///
    /// Returned for payloads the server would reject, such as an array
    /// dataref write with a non-array type tag.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when a transport cannot be established to an endpoint.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The client event loop has shut down.
    ///
    /// Returned when an operation is attempted after [`shutdown`] or after
    /// the event loop terminated.
    ///
    /// [`shutdown`]: crate::Client::shutdown
    #[error("Client closed")]
    ClientClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    ///
    /// Returned when a server message cannot be interpreted.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ClientClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a programmer fault.
    ///
    /// Programmer faults indicate the caller misused the API; retrying the
    /// same call cannot succeed.
    #[inline]
    #[must_use]
    pub fn is_programmer_fault(&self) -> bool {
        matches!(self, Self::MissingIdentifier | Self::InvalidArgument { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_missing_identifier_display() {
        let err = Error::MissingIdentifier;
        assert!(err.to_string().contains("session identifier"));
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ClientClosed.is_connection_error());
        assert!(!Error::MissingIdentifier.is_connection_error());
    }

    #[test]
    fn test_is_programmer_fault() {
        assert!(Error::MissingIdentifier.is_programmer_fault());
        assert!(Error::invalid_argument("bad type").is_programmer_fault());
        assert!(!Error::protocol("test").is_programmer_fault());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
