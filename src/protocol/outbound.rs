//! Outbound message types.
//!
//! Messages sent by the client to the instrument server. Every outbound
//! frame is a JSON object tagged by `command`, carrying the session
//! identifier in `id`:
//!
//! ```json
//! { "id": "a1b2c3", "command": "SUBSCRIBE", "precision": 0.01, "data": ["sim/time/zulu_time_sec"] }
//! ```
//!
//! [`Envelope`] pairs a payload with the identifier; building an envelope
//! is gated by the session state machine, which guarantees an identifier
//! exists.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// Envelope
// ============================================================================

/// An outbound message with its mandatory session identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Session identifier issued during the handshake.
    pub id: SessionId,

    /// Command payload, flattened into the same JSON object.
    #[serde(flatten)]
    pub payload: OutboundMessage,
}

impl Envelope {
    /// Creates an envelope carrying the given payload.
    #[inline]
    #[must_use]
    pub fn new(id: SessionId, payload: OutboundMessage) -> Self {
        Self { id, payload }
    }

    /// Serializes the envelope to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    #[inline]
    pub fn to_wire(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Json)
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// All outbound command payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command")]
pub enum OutboundMessage {
    /// Caller metadata sent immediately after the identifier is assigned.
    #[serde(rename = "IDENTIFY")]
    Identify {
        /// Arbitrary caller-supplied metadata.
        data: Value,
    },

    /// Single dataref write.
    #[serde(rename = "SET")]
    Set {
        /// Dataref name.
        dataref: String,
        /// Stringified value.
        data: String,
        /// Value type tag.
        #[serde(rename = "type")]
        value_type: DatarefType,
    },

    /// Array dataref write at an offset.
    #[serde(rename = "ASET")]
    SetArray {
        /// Dataref name.
        dataref: String,
        /// Array type tag.
        #[serde(rename = "type")]
        value_type: ArrayType,
        /// Values to write.
        data: Vec<f64>,
        /// Index of the first element to write.
        offset: usize,
    },

    /// One-shot read of the named datarefs.
    #[serde(rename = "GET_ONCE")]
    GetOnce {
        /// Dataref names to read.
        data: Vec<String>,
    },

    /// Subscription to the named datarefs.
    #[serde(rename = "SUBSCRIBE")]
    Subscribe {
        /// Quantization granularity hint, forwarded verbatim.
        precision: f64,
        /// Dataref names to watch.
        data: Vec<String>,
    },

    /// Registration of interest in a simulator command.
    #[serde(rename = "REGISTER_CMD_CALLBACK")]
    RegisterCommandCallback {
        /// Command name.
        data: String,
    },

    /// Aircraft reposition request.
    #[serde(rename = "REPOSITION")]
    Reposition {
        /// Destination airport or explicit position.
        data: RepositionTarget,
    },

    /// Simulator command invocation.
    #[serde(rename = "RUN_COMMAND")]
    RunCommand {
        /// Command name.
        data: String,
        /// Invocation phase.
        #[serde(rename = "type")]
        phase: CommandPhase,
    },
}

// ============================================================================
// DatarefType
// ============================================================================

/// Value type tag for scalar dataref writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatarefType {
    /// Integer dataref.
    #[serde(rename = "INT")]
    Int,
    /// Single-precision float dataref.
    #[serde(rename = "FLOAT")]
    Float,
    /// Double-precision float dataref.
    #[serde(rename = "DOUBLE")]
    Double,
}

impl DatarefType {
    /// Promotes a scalar type tag to its array variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for types without an array
    /// variant; the server only accepts `INT_ARRAY` and `FLOAT_ARRAY`.
    pub fn into_array_type(self) -> Result<ArrayType> {
        match self {
            Self::Int => Ok(ArrayType::IntArray),
            Self::Float => Ok(ArrayType::FloatArray),
            Self::Double => Err(Error::invalid_argument(
                "array writes accept only INT or FLOAT element types",
            )),
        }
    }
}

// ============================================================================
// ArrayType
// ============================================================================

/// Value type tag for array dataref writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArrayType {
    /// Integer array dataref.
    #[serde(rename = "INT_ARRAY")]
    IntArray,
    /// Float array dataref.
    #[serde(rename = "FLOAT_ARRAY")]
    FloatArray,
}

// ============================================================================
// RepositionTarget
// ============================================================================

/// Destination of a `REPOSITION` request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RepositionTarget {
    /// Airport ICAO code, e.g. `"KSEA"`.
    Airport(String),
    /// Explicit position.
    Position(Position),
}

/// Structured reposition payload.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Position {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Heading in degrees.
    pub hdg: f64,
    /// Altitude in feet.
    pub alt: f64,
    /// Speed in knots.
    pub speed: f64,
    /// Skip the repositioning animation.
    pub fast: bool,
}

// ============================================================================
// CommandPhase
// ============================================================================

/// Phase tag of a `RUN_COMMAND` invocation.
///
/// Serialized as its numeric wire value: 0 = once, 1 = begin, 2 = end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    /// Fire the command once.
    Once,
    /// Begin holding the command.
    Begin,
    /// Release a held command.
    End,
}

impl CommandPhase {
    /// Returns the numeric wire value for this phase.
    #[inline]
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::Once => 0,
            Self::Begin => 1,
            Self::End => 2,
        }
    }
}

impl Serialize for CommandPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.serialize_u8(self.wire_value())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(payload: OutboundMessage) -> Value {
        let envelope = Envelope::new(SessionId::new("tok"), payload);
        serde_json::from_str(&envelope.to_wire().expect("serialize")).expect("valid json")
    }

    #[test]
    fn test_identify_wire_format() {
        let value = wire(OutboundMessage::Identify {
            data: json!({"name": "pfd", "version": "1.0"}),
        });

        assert_eq!(value["id"], "tok");
        assert_eq!(value["command"], "IDENTIFY");
        assert_eq!(value["data"]["name"], "pfd");
    }

    #[test]
    fn test_set_wire_format() {
        let value = wire(OutboundMessage::Set {
            dataref: "sim/cockpit/autopilot/heading_mag".to_string(),
            data: "270".to_string(),
            value_type: DatarefType::Float,
        });

        assert_eq!(value["command"], "SET");
        assert_eq!(value["dataref"], "sim/cockpit/autopilot/heading_mag");
        assert_eq!(value["data"], "270");
        assert_eq!(value["type"], "FLOAT");
    }

    #[test]
    fn test_set_array_wire_format() {
        let value = wire(OutboundMessage::SetArray {
            dataref: "sim/flightmodel/engine/ENGN_thro".to_string(),
            value_type: ArrayType::FloatArray,
            data: vec![0.5, 0.5],
            offset: 0,
        });

        assert_eq!(value["command"], "ASET");
        assert_eq!(value["type"], "FLOAT_ARRAY");
        assert_eq!(value["data"], json!([0.5, 0.5]));
        assert_eq!(value["offset"], 0);
    }

    #[test]
    fn test_subscribe_wire_format() {
        let value = wire(OutboundMessage::Subscribe {
            precision: 0.01,
            data: vec!["sim/time/zulu_time_sec".to_string()],
        });

        assert_eq!(value["command"], "SUBSCRIBE");
        assert_eq!(value["precision"], 0.01);
        assert_eq!(value["data"], json!(["sim/time/zulu_time_sec"]));
    }

    #[test]
    fn test_reposition_airport() {
        let value = wire(OutboundMessage::Reposition {
            data: RepositionTarget::Airport("KSEA".to_string()),
        });

        assert_eq!(value["command"], "REPOSITION");
        assert_eq!(value["data"], "KSEA");
    }

    #[test]
    fn test_reposition_position() {
        let value = wire(OutboundMessage::Reposition {
            data: RepositionTarget::Position(Position {
                lat: 47.4,
                lon: -122.3,
                hdg: 180.0,
                alt: 3000.0,
                speed: 120.0,
                fast: true,
            }),
        });

        assert_eq!(value["data"]["lat"], 47.4);
        assert_eq!(value["data"]["fast"], true);
    }

    #[test]
    fn test_run_command_phases() {
        for (phase, expected) in [
            (CommandPhase::Once, 0),
            (CommandPhase::Begin, 1),
            (CommandPhase::End, 2),
        ] {
            let value = wire(OutboundMessage::RunCommand {
                data: "sim/flight_controls/gear_toggle".to_string(),
                phase,
            });
            assert_eq!(value["command"], "RUN_COMMAND");
            assert_eq!(value["type"], expected);
        }
    }

    #[test]
    fn test_array_type_promotion() {
        assert_eq!(
            DatarefType::Int.into_array_type().expect("promotes"),
            ArrayType::IntArray
        );
        assert_eq!(
            DatarefType::Float.into_array_type().expect("promotes"),
            ArrayType::FloatArray
        );
        assert!(DatarefType::Double.into_array_type().is_err());
    }
}
