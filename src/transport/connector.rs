//! Transport connector trait and WebSocket implementation.
//!
//! A [`Connector`] opens one transport to an [`Endpoint`] and hands back a
//! [`TransportHandle`]: an outbound text sink plus a stream of
//! [`TransportEvent`]s. The session state machine owns at most one live
//! handle at a time and reacts to its events.
//!
//! [`WsConnector`] is the production implementation over tokio-tungstenite.
//! Tests (and alternative transports) implement [`Connector`] and build
//! handles with [`TransportHandle::pair`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when a transport dies without a closing handshake.
///
/// This is the code that triggers the automatic reconnect with port
/// failover; closures carrying any other code are left to the caller.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported when no status was present in the close frame.
const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// Endpoint
// ============================================================================

/// A candidate transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the WebSocket URL for this endpoint.
    ///
    /// Format: `ws://{host}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Event raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport finished opening and is ready to carry messages.
    Opened,
    /// A text message arrived.
    Message(String),
    /// A transport-level error occurred. Does not itself imply closure.
    Error(String),
    /// The transport closed with the given close code.
    Closed {
        /// WebSocket close code; [`ABNORMAL_CLOSURE`] when the transport
        /// died without a closing handshake.
        code: u16,
    },
}

// ============================================================================
// TransportHandle
// ============================================================================

/// Handle to one live transport.
///
/// Dropping the handle closes the transport: the I/O task observes the
/// outbound channel closing and shuts the socket down.
pub struct TransportHandle {
    /// Outbound text frames.
    outbound: mpsc::UnboundedSender<String>,
    /// Events raised by the transport.
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    /// Creates a handle from its two channel halves.
    #[inline]
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    /// Creates a connected handle/peer pair with no I/O behind it.
    ///
    /// The [`TransportPeer`] plays the remote side: it observes everything
    /// sent through the handle and injects events into it. Used by tests
    /// and by custom transport implementations.
    #[must_use]
    pub fn pair() -> (Self, TransportPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self::new(outbound_tx, event_rx),
            TransportPeer {
                sent: outbound_rx,
                events: event_tx,
            },
        )
    }

    /// Sends a text frame over the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the transport task has terminated.
    pub fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| Error::connection("transport closed"))
    }

    /// Receives the next transport event.
    ///
    /// Returns `None` once the transport task has terminated and all
    /// buffered events were drained.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("open", &!self.outbound.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TransportPeer
// ============================================================================

/// The remote side of a [`TransportHandle::pair`].
pub struct TransportPeer {
    /// Text frames sent through the paired handle.
    pub sent: mpsc::UnboundedReceiver<String>,
    /// Injects events into the paired handle.
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportPeer {
    /// Injects an event into the paired handle.
    ///
    /// Returns `false` if the handle was dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens transports to endpoints.
///
/// The session state machine calls `connect` for the initial connection,
/// every reconnect attempt, and every server-initiated redirect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a transport to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the transport cannot be
    /// established; the state machine treats this like an abnormal closure
    /// and retries on the other candidate port.
    async fn connect(&self, endpoint: &Endpoint) -> Result<TransportHandle>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket connector over tokio-tungstenite.
///
/// Each successful `connect` spawns one I/O task bridging the socket and
/// the handle's channels. The task exits when the socket closes or the
/// handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<TransportHandle> {
        let url = endpoint.ws_url();
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::connection(format!("connect to {url} failed: {e}")))?;

        debug!(%endpoint, "WebSocket transport opened");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_socket(ws_stream, outbound_rx, event_tx));

        Ok(TransportHandle::new(outbound_tx, event_rx))
    }
}

/// I/O task bridging one WebSocket and one [`TransportHandle`].
async fn run_socket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    // The socket is open by the time connect_async returns.
    let _ = event_tx.send(TransportEvent::Opened);

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Text frame received");
                        let _ = event_tx.send(TransportEvent::Message(text.to_string()));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let code = frame
                            .map(|f| u16::from(f.code))
                            .unwrap_or(NO_STATUS_RECEIVED);
                        debug!(code, "WebSocket closed by remote");
                        let _ = event_tx.send(TransportEvent::Closed { code });
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                        });
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended without close frame");
                        let _ = event_tx.send(TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                        });
                        break;
                    }

                    // Ignore Binary, Ping, Pong, Frame
                    _ => {}
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                            let _ = event_tx.send(TransportEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                            });
                            break;
                        }
                    }

                    None => {
                        // Handle dropped; close the socket gracefully.
                        debug!("Transport handle dropped, closing socket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_ws_url() {
        let endpoint = Endpoint::new("localhost", 9003);
        assert_eq!(endpoint.ws_url(), "ws://localhost:9003");
        assert_eq!(endpoint.to_string(), "localhost:9003");
    }

    #[tokio::test]
    async fn test_pair_delivers_sends_to_peer() {
        let (handle, mut peer) = TransportHandle::pair();

        handle.send("hello".to_string()).expect("send");
        assert_eq!(peer.sent.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_pair_delivers_events_to_handle() {
        let (mut handle, peer) = TransportHandle::pair();

        assert!(peer.emit(TransportEvent::Opened));
        assert_eq!(handle.next_event().await, Some(TransportEvent::Opened));
    }

    #[tokio::test]
    async fn test_dropped_handle_closes_peer() {
        let (handle, mut peer) = TransportHandle::pair();
        drop(handle);

        assert_eq!(peer.sent.recv().await, None);
        assert!(!peer.emit(TransportEvent::Opened));
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_fails() {
        let (handle, peer) = TransportHandle::pair();
        drop(peer);

        let err = handle.send("x".to_string()).unwrap_err();
        assert!(err.is_connection_error());
    }
}
