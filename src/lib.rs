//! simlink - Realtime instrument link for flight-simulator glass cockpits.
//!
//! This library connects instrument software (PFDs, MFDs, annunciator
//! panels) to a running simulator over a local WebSocket bridge, keeping a
//! live mirror of simulator state and pushing control inputs back.
//!
//! # Architecture
//!
//! The link follows a client-server model:
//!
//! - **Client (Rust)**: Subscribes to datarefs, sends commands and writes
//! - **Server (simulator bridge)**: Streams value updates, relays commands
//!
//! Key design principles:
//!
//! - Each [`Client`] owns: WebSocket connection + event loop + session
//! - Every request carries the server-assigned session identifier
//! - Subscriptions survive reconnects and server-initiated redirects
//! - Event-driven architecture (value batches push to the client)
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use simlink::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Connect to the local bridge, trying the instrument port first
//!     let client = Client::connect(
//!         ClientConfig::auto(),
//!         json!({"instrument": "pfd"}),
//!         |client| {
//!             // Runs after every completed handshake
//!             client
//!                 .subscribe_datarefs(
//!                     |values| println!("altitude: {} ft", values[0]),
//!                     0.25,
//!                     &["sim/cockpit2/gauges/indicators/altitude_ft_pilot"],
//!                 )
//!                 .expect("subscribe");
//!         },
//!     );
//!
//!     // ... drive the instrument ...
//!     client.shutdown();
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client handle, event loop, dispatch engine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | WebSocket transport layer (internal) |
//!
//! # Features
//!
//! - **Resilient**: Port failover, timed reconnects, redirect handling
//! - **Throttled dispatch**: Per-subscription minimum update intervals
//! - **Positional callbacks**: Values delivered in declared dataref order
//! - **Cheap handles**: [`Client`] clones share one link

// ============================================================================
// Modules
// ============================================================================

/// Client handle and event loop.
///
/// This module contains the public client surface:
///
/// - [`Client`] - Handle to one instrument link
/// - [`ClientConfig`] - Host, candidate ports, reconnect delay
/// - [`SubscribeOptions`] - Precision-aware subscription options
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for link entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
///
/// Inbound server messages and outbound request envelopes.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling connection setup and socket I/O.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientConfig, ClientEvent, DatarefCallback, SubscribeOptions, INSTRUMENT_PORT,
    RECONNECT_DELAY, SIMULATOR_PORT, TRIAL_LIMIT_NOTICE,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallbackId, SessionId, SubscriptionId};

// Protocol types
pub use protocol::{
    ArrayType, CommandPhase, DatarefType, Position, RepositionTarget, ServerMessage,
};

// Transport types
pub use transport::{Connector, Endpoint, TransportEvent, TransportHandle, TransportPeer, WsConnector};
