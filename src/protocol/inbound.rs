//! Inbound message types.
//!
//! Messages sent by the instrument server to the client. Every inbound
//! frame is a JSON object tagged by `type` with its payload in `value`:
//!
//! ```json
//! { "type": "RES", "value": { "sim/flightmodel/position/indicated_airspeed": 134.2 } }
//! ```
//!
//! # Message Kinds
//!
//! | Kind | Payload | Meaning |
//! |------|---------|---------|
//! | `LOG` | string | Diagnostic text |
//! | `ID` | string | Session identifier assignment |
//! | `RES` | map name→number | Batch of dataref values |
//! | `COMMAND` | string | Command notification |
//! | `ONCE` | arbitrary | One-shot read result (FIFO correlated) |
//! | `CHNGCONN` | `{host, port}` | Redirect instruction |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// ServerMessage
// ============================================================================

/// A message from the instrument server.
///
/// Unknown `type` tags fail deserialization; the event loop logs and drops
/// such frames rather than failing the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ServerMessage {
    /// Diagnostic text from the server.
    #[serde(rename = "LOG")]
    Log(String),

    /// Session identifier assignment (handshake).
    #[serde(rename = "ID")]
    Id(String),

    /// Batch of dataref values, keyed by dataref name.
    #[serde(rename = "RES")]
    Values(FxHashMap<String, f64>),

    /// Notification that a simulator command fired.
    #[serde(rename = "COMMAND")]
    Command(String),

    /// Result of a one-shot dataref read.
    ///
    /// Correlation is strictly positional: the nth outstanding `GET_ONCE`
    /// request is resolved by the nth `ONCE` response.
    #[serde(rename = "ONCE")]
    Once(Value),

    /// Server-initiated redirect to a different endpoint.
    #[serde(rename = "CHNGCONN")]
    ChangeConnection(RedirectTarget),
}

impl ServerMessage {
    /// Returns the message kind as a static string, for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log(_) => "LOG",
            Self::Id(_) => "ID",
            Self::Values(_) => "RES",
            Self::Command(_) => "COMMAND",
            Self::Once(_) => "ONCE",
            Self::ChangeConnection(_) => "CHNGCONN",
        }
    }
}

// ============================================================================
// RedirectTarget
// ============================================================================

/// Payload of a `CHNGCONN` redirect instruction.
///
/// Both fields must be present for the instruction to take effect; a
/// redirect missing either field is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectTarget {
    /// Host to relocate to.
    #[serde(default)]
    pub host: Option<String>,

    /// Port to relocate to.
    #[serde(default)]
    pub port: Option<u16>,
}

impl RedirectTarget {
    /// Returns the `(host, port)` pair if both fields are present.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> Option<(&str, u16)> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Some((host.as_str(), port)),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
