//! Client event loop and session state machine.
//!
//! One tokio task per client multiplexes two sources:
//!
//! - events from the active transport (open, message, error, close)
//! - loop commands from API handles and timers (outbound frames,
//!   reconnect firings, shutdown)
//!
//! All session state transitions happen on this task. Timers never block
//! it: reconnect delays and send-failure restarts are spawned sleeps that
//! post a [`LoopCommand`] back into the loop.
//!
//! # Session Lifecycle
//!
//! ```text
//!            open            ID assigned
//! Connecting ─────► Identifying ─────► Active
//!     ▲                  ▲               │
//!     │  close(1006)     │   CHNGCONN    │
//!     └──────── 5s ──────┴───────────────┘
//! ```
//!
//! Abnormal closures flip between the two candidate ports before
//! reconnecting. Redirects keep subscriptions and the dataref cache but
//! clear the command callback registry and force a fresh handshake.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::client::Client;
use crate::client::dispatch::DispatchEngine;
use crate::client::options::ClientConfig;
use crate::client::registry::{CommandRegistry, OnceQueue};
use crate::identifiers::SessionId;
use crate::protocol::{Envelope, OutboundMessage, RedirectTarget, ServerMessage};
use crate::transport::{ABNORMAL_CLOSURE, Connector, Endpoint, TransportEvent, TransportHandle};

// ============================================================================
// Constants
// ============================================================================

/// Server diagnostic that is surfaced to the end user, not just logged.
pub const TRIAL_LIMIT_NOTICE: &str = "Subscription limit for free trial version exceeded";

// ============================================================================
// Types
// ============================================================================

/// Callback invoked after every successful handshake, including the ones
/// that follow reconnects and redirects.
pub type ReadyCallback = Box<dyn FnMut(&Client) + Send>;

/// Handler for loading-state notifications.
pub type LoadingStateCallback = Box<dyn FnMut(bool) + Send>;

/// Handler for transport-level errors.
pub type TimeoutCallback = Box<dyn FnMut() + Send>;

/// Handler for user-visible server notices (the trial-limit banner seam).
pub type NoticeCallback = Box<dyn FnMut(&str) + Send>;

// ============================================================================
// LoopCommand
// ============================================================================

/// Commands posted into the event loop by API handles and timers.
pub(crate) enum LoopCommand {
    /// Send a serialized envelope over the active transport.
    SendText(String),
    /// A recovery timer fired; reopen the transport, flipping the
    /// candidate port when the recovery came from an abnormal closure.
    Reconnect {
        /// Whether to flip primary↔fallback before reconnecting.
        flip: bool,
    },
    /// Terminate the event loop.
    Shutdown,
}

// ============================================================================
// EventHandlers
// ============================================================================

/// Caller-registered event handlers.
///
/// Each handler sits behind its own lock so the event loop can release
/// the `handlers` mutex before invoking it; a handler may re-register
/// handlers without deadlocking.
#[derive(Default)]
pub(crate) struct EventHandlers {
    /// `loadingStateChanges` handler.
    pub loading_state: Option<Arc<Mutex<LoadingStateCallback>>>,
    /// `connectionTimeout` handler, invoked on transport errors.
    pub timeout: Option<Arc<Mutex<TimeoutCallback>>>,
    /// User-visible notice handler.
    pub notice: Option<Arc<Mutex<NoticeCallback>>>,
}

// ============================================================================
// ClientInner
// ============================================================================

/// State shared between API handles and the event loop.
///
/// Mutated only from API calls and the loop task; the mutexes are held for
/// short, non-reentrant critical sections.
pub(crate) struct ClientInner {
    /// Current session identifier, mirrored for envelope building.
    pub session: Mutex<Option<SessionId>>,
    /// Dataref cache and subscriptions.
    pub dispatch: Mutex<DispatchEngine>,
    /// Command callbacks.
    pub registry: Mutex<CommandRegistry>,
    /// Pending one-shot read callbacks.
    pub once_queue: Mutex<OnceQueue>,
    /// Caller-registered handlers.
    pub handlers: Mutex<EventHandlers>,
    /// Posts commands into the event loop.
    pub command_tx: mpsc::UnboundedSender<LoopCommand>,
}

impl ClientInner {
    /// Creates fresh shared state.
    pub(crate) fn new(command_tx: mpsc::UnboundedSender<LoopCommand>) -> Self {
        Self {
            session: Mutex::new(None),
            dispatch: Mutex::new(DispatchEngine::new()),
            registry: Mutex::new(CommandRegistry::new()),
            once_queue: Mutex::new(OnceQueue::new()),
            handlers: Mutex::new(EventHandlers::default()),
            command_tx,
        }
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// A transport is being opened against a candidate endpoint.
    Connecting,
    /// Transport open, no session identifier yet.
    Identifying,
    /// Handshake complete; full message routing enabled.
    Active,
}

// ============================================================================
// ClientCore
// ============================================================================

/// The event loop driving one client.
pub(crate) struct ClientCore {
    inner: Arc<ClientInner>,
    connector: Arc<dyn Connector>,
    command_rx: mpsc::UnboundedReceiver<LoopCommand>,
    /// Caller metadata sent with `IDENTIFY` after every handshake.
    metadata: Value,
    on_ready: ReadyCallback,
    config: ClientConfig,
    /// Endpoint of the current (or next) transport. Redirects move it off
    /// the configured host; reconnects keep the host and flip the port.
    endpoint: Endpoint,
    phase: Phase,
    transport: Option<TransportHandle>,
    /// Guards against stacking recovery timers.
    recovery_pending: bool,
}

impl ClientCore {
    /// Creates a core ready to run.
    pub(crate) fn new(
        inner: Arc<ClientInner>,
        connector: Arc<dyn Connector>,
        command_rx: mpsc::UnboundedReceiver<LoopCommand>,
        config: ClientConfig,
        metadata: Value,
        on_ready: ReadyCallback,
    ) -> Self {
        let endpoint = config.primary_endpoint();
        Self {
            inner,
            connector,
            command_rx,
            metadata,
            on_ready,
            config,
            endpoint,
            phase: Phase::Connecting,
            transport: None,
            recovery_pending: false,
        }
    }

    /// Runs the event loop until shutdown.
    pub(crate) async fn run(mut self) {
        self.open_transport().await;

        loop {
            tokio::select! {
                event = next_transport_event(&mut self.transport) => {
                    match event {
                        Some(event) => self.on_transport_event(event).await,
                        // I/O task gone; a Closed event was already
                        // delivered (or a recovery is pending).
                        None => self.transport = None,
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(LoopCommand::SendText(text)) => self.send_text(text),
                        Some(LoopCommand::Reconnect { flip }) => self.reconnect(flip).await,
                        Some(LoopCommand::Shutdown) | None => break,
                    }
                }
            }
        }

        debug!("Event loop terminated");
    }

    // ========================================================================
    // Transport lifecycle
    // ========================================================================

    /// Opens a transport to the current endpoint.
    async fn open_transport(&mut self) {
        self.phase = Phase::Connecting;

        match self.connector.connect(&self.endpoint).await {
            Ok(handle) => {
                self.transport = Some(handle);
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Connect failed");
                self.transport = None;
                self.schedule_recovery(true);
            }
        }
    }

    /// Schedules a recovery after the configured delay, unless one is
    /// already pending.
    fn schedule_recovery(&mut self, flip: bool) {
        if self.recovery_pending {
            return;
        }
        self.recovery_pending = true;

        let command_tx = self.inner.command_tx.clone();
        let delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = command_tx.send(LoopCommand::Reconnect { flip });
        });
    }

    /// Executes a recovery: flip the candidate port if requested, discard
    /// the session, and open a fresh transport.
    async fn reconnect(&mut self, flip: bool) {
        self.recovery_pending = false;

        if flip {
            let port = self.config.other_port(self.endpoint.port);
            self.endpoint = Endpoint::new(self.endpoint.host.clone(), port);
        }
        *self.inner.session.lock() = None;

        info!(endpoint = %self.endpoint, "Reconnecting");
        self.open_transport().await;
    }

    /// Sends a serialized frame over the active transport.
    ///
    /// Send failures have no finer-grained recovery: the connection is
    /// restarted wholesale after the fixed delay.
    fn send_text(&mut self, text: String) {
        let sent = match &self.transport {
            Some(handle) => handle.send(text).is_ok(),
            None => false,
        };

        if sent {
            trace!("Frame sent");
        } else {
            warn!("Send failed on closed transport, scheduling restart");
            self.schedule_recovery(false);
        }
    }

    // ========================================================================
    // Event handling
    // ========================================================================

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                debug!(endpoint = %self.endpoint, "Transport open, awaiting identity");
                self.phase = Phase::Identifying;
            }

            TransportEvent::Message(text) => self.on_message(&text).await,

            TransportEvent::Error(message) => {
                warn!(message, "Transport error");
                let callback = self.inner.handlers.lock().timeout.clone();
                if let Some(callback) = callback {
                    (*callback.lock())();
                }
            }

            TransportEvent::Closed { code } => {
                if code == ABNORMAL_CLOSURE {
                    debug!(code, "Abnormal closure, scheduling reconnect");
                    self.transport = None;
                    self.schedule_recovery(true);
                } else {
                    // Other closures are left to the caller's own timeout
                    // handling.
                    debug!(code, "Transport closed");
                }
            }
        }
    }

    async fn on_message(&mut self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable server message");
                return;
            }
        };

        if self.phase == Phase::Active {
            self.on_routed_message(message).await;
        } else {
            self.on_handshake_message(message);
        }
    }

    /// Handles messages received before a session identifier exists.
    ///
    /// Only `LOG` and `ID` are meaningful here; anything else is dropped.
    fn on_handshake_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Log(text) => self.on_server_log(&text),

            ServerMessage::Id(token) => {
                let session = SessionId::new(token);
                info!(session = %session, "Session identifier assigned");
                *self.inner.session.lock() = Some(session.clone());
                self.phase = Phase::Active;

                self.send_identity(&session);

                let client = Client::from_inner(Arc::clone(&self.inner));
                (self.on_ready)(&client);
            }

            other => {
                warn!(
                    kind = other.kind(),
                    "Dropping message received before handshake"
                );
            }
        }
    }

    /// Routes messages once the session is active.
    async fn on_routed_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Values(values) => {
                let firings = self
                    .inner
                    .dispatch
                    .lock()
                    .evaluate_batch(&values, Instant::now());

                // Invoked with no engine lock held; callbacks may call
                // back into the client.
                for firing in firings {
                    firing.invoke();
                }
            }

            ServerMessage::Command(name) => {
                let callbacks = self.inner.registry.lock().callbacks_for(&name);
                trace!(command = %name, invoked = callbacks.len(), "Command notification");
                for callback in &callbacks {
                    (*callback.lock())();
                }
            }

            ServerMessage::Once(value) => {
                let callback = self.inner.once_queue.lock().pop();
                match callback {
                    Some(callback) => callback(value),
                    None => warn!("ONCE response with no pending request"),
                }
            }

            ServerMessage::Log(text) => self.on_server_log(&text),

            ServerMessage::ChangeConnection(target) => self.on_redirect(target).await,

            ServerMessage::Id(_) => {
                warn!(kind = "ID", "Unexpected message kind while active");
            }
        }
    }

    /// Surfaces a server diagnostic; during the handshake the trial-limit
    /// text additionally reaches the user-visible notice handler.
    ///
    /// The server only emits the trial banner before an identifier is
    /// assigned; once active, logs are diagnostics only.
    fn on_server_log(&self, text: &str) {
        warn!(server = %text, "Server diagnostic");

        if self.phase != Phase::Active && text == TRIAL_LIMIT_NOTICE {
            let notice = self.inner.handlers.lock().notice.clone();
            if let Some(notice) = notice {
                (*notice.lock())(text);
            }
        }
    }

    /// Relocates to a server-designated endpoint.
    ///
    /// Subscriptions and the dataref cache survive; the session identifier
    /// and the command callback registry do not.
    async fn on_redirect(&mut self, target: RedirectTarget) {
        let Some((host, port)) = target.endpoint() else {
            debug!("Redirect missing host or port, ignoring");
            return;
        };

        let endpoint = Endpoint::new(host, port);
        info!(%endpoint, "Server-initiated redirect");

        match self.connector.connect(&endpoint).await {
            Ok(new_transport) => {
                // The replacement is wired before the old transport closes,
                // so no window exists with no listener. Dropping the old
                // handle closes its socket.
                let old = self.transport.replace(new_transport);
                drop(old);

                self.endpoint = endpoint;
                *self.inner.session.lock() = None;
                self.inner.registry.lock().clear();
                self.phase = Phase::Connecting;
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "Redirect connect failed");
                self.endpoint = endpoint;
                self.transport = None;
                *self.inner.session.lock() = None;
                self.inner.registry.lock().clear();
                self.schedule_recovery(true);
            }
        }
    }

    /// Sends `IDENTIFY` with the caller metadata, immediately after the
    /// identifier is assigned.
    fn send_identity(&mut self, session: &SessionId) {
        let envelope = Envelope::new(
            session.clone(),
            OutboundMessage::Identify {
                data: self.metadata.clone(),
            },
        );

        match envelope.to_wire() {
            Ok(text) => self.send_text(text),
            Err(e) => warn!(error = %e, "Failed to serialize IDENTIFY"),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Receives the next event from the active transport, or parks when no
/// transport is live (a recovery timer will wake the loop).
async fn next_transport_event(transport: &mut Option<TransportHandle>) -> Option<TransportEvent> {
    match transport {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_limit_notice_text() {
        // The exact text is matched against server diagnostics.
        assert_eq!(
            TRIAL_LIMIT_NOTICE,
            "Subscription limit for free trial version exceeded"
        );
    }

    #[test]
    fn test_phase_transitions_are_distinct() {
        assert_ne!(Phase::Connecting, Phase::Identifying);
        assert_ne!(Phase::Identifying, Phase::Active);
    }
}
