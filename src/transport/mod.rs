//! Transport layer.
//!
//! This module handles communication between the client and the instrument
//! server over a full-duplex message transport.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │  Client (Rust)   │                          │  Instrument      │
//! │                  │        WebSocket         │  Server          │
//! │  Connector       │◄────────────────────────►│                  │
//! │  → Transport     │      host:9003/9002      │  (simulator      │
//! │    Handle        │                          │   plugin)        │
//! └──────────────────┘                          └──────────────────┘
//! ```
//!
//! # Transport Lifecycle
//!
//! 1. [`Connector::connect`] opens a transport to a candidate [`Endpoint`]
//! 2. The handle raises [`TransportEvent::Opened`], then messages
//! 3. On abnormal closure the session state machine reconnects on the
//!    other candidate port; on redirect it connects to the new endpoint
//!    and drops the old handle
//! 4. Dropping a [`TransportHandle`] closes its socket
//!
//! The [`Connector`] trait is the seam for tests and alternative
//! transports: any full-duplex message transport satisfies it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | Connector trait, WebSocket implementation, events |

// ============================================================================
// Submodules
// ============================================================================

/// Transport connector trait and WebSocket implementation.
pub mod connector;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{
    ABNORMAL_CLOSURE, Connector, Endpoint, TransportEvent, TransportHandle, TransportPeer,
    WsConnector,
};
