//! Wire protocol message types.
//!
//! This module defines the JSON message format spoken between the client
//! and the instrument server.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Envelope`] + [`OutboundMessage`] | Client → Server | Command request |
//! | [`ServerMessage`] | Server → Client | Values, notifications, lifecycle |
//!
//! Inbound messages are tagged by `type` with payload in `value`; outbound
//! messages are tagged by `command` and always carry the session identifier
//! in `id`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Server → client message kinds |
//! | `outbound` | Client → server envelope and payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound message types.
pub mod inbound;

/// Outbound message types.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::{RedirectTarget, ServerMessage};
pub use outbound::{
    ArrayType, CommandPhase, DatarefType, Envelope, OutboundMessage, Position, RepositionTarget,
};
