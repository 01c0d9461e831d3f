//! Type-safe identifiers for client entities.
//!
//! Newtype wrappers prevent mixing incompatible identifiers at compile time:
//!
//! | Type | Backing | Origin |
//! |------|---------|--------|
//! | [`SessionId`] | opaque string | issued by the server on handshake |
//! | [`SubscriptionId`] | UUID v4 | generated locally per subscription |
//! | [`CallbackId`] | UUID v4 | generated locally per command callback |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SessionId
// ============================================================================

/// Opaque session identifier issued by the server during the handshake.
///
/// Required on every outbound message. Invalidated by reconnects and
/// redirects; a fresh one is issued on each successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session identifier from a server-issued token.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Unique identifier for a dataref subscription.
///
/// Generated locally when a subscription is registered. There is no
/// unsubscribe operation for dataref subscriptions; the identifier exists
/// so callers can correlate subscriptions in their own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// CallbackId
// ============================================================================

/// Unique identifier for a registered command callback.
///
/// Returned by [`register_command_callback`] and used to remove exactly
/// that callback with [`remove_command_callback`].
///
/// [`register_command_callback`]: crate::Client::register_command_callback
/// [`remove_command_callback`]: crate::Client::remove_command_callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(Uuid);

impl CallbackId {
    /// Generates a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Tests
// ============================================================================
