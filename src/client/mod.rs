//! Client handle and public operations.
//!
//! [`Client`] is a cheaply cloneable handle to one instrument link. All
//! public operations are thin formatters over a single outbound envelope
//! path; the state and decision logic live in the event loop core and the
//! dispatch engine.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Event loop and session state machine |
//! | `dispatch` | Dataref cache and subscription dispatch engine |
//! | `options` | Client configuration |
//! | `registry` | Command callback registry and one-shot queue |

// ============================================================================
// Submodules
// ============================================================================

/// Client event loop and session state machine.
pub mod core;

/// Dataref cache and subscription dispatch engine.
pub mod dispatch;

/// Client configuration.
pub mod options;

/// Command callback registry and one-shot request queue.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{
    LoadingStateCallback, NoticeCallback, ReadyCallback, TimeoutCallback, TRIAL_LIMIT_NOTICE,
};
pub use dispatch::DatarefCallback;
pub use options::{ClientConfig, INSTRUMENT_PORT, RECONNECT_DELAY, SIMULATOR_PORT};
pub use registry::{CommandCallback, OnceCallback};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::identifiers::{CallbackId, SessionId, SubscriptionId};
use crate::protocol::{
    CommandPhase, DatarefType, Envelope, OutboundMessage, Position, RepositionTarget,
};
use crate::transport::{Connector, WsConnector};

use self::core::{ClientCore, ClientInner, LoopCommand};

// ============================================================================
// Constants
// ============================================================================

/// Precision hint sent by the simplified subscription entry point.
const DEFAULT_PRECISION: f64 = 0.01;

// ============================================================================
// ClientEvent
// ============================================================================

/// Named client events and their handlers.
///
/// Registered with [`Client::on`]; each event holds at most one handler,
/// and registering again replaces the previous one.
pub enum ClientEvent {
    /// The instrument's loading state changed.
    LoadingStateChanges(LoadingStateCallback),
    /// The transport reported an error; the connection may be stalled.
    ConnectionTimeout(TimeoutCallback),
}

// ============================================================================
// SubscribeOptions
// ============================================================================

/// Options for the precision-aware subscription entry point.
///
/// # Example
///
/// ```ignore
/// use simlink::SubscribeOptions;
///
/// client.subscribe_datarefs_with_precision(
///     SubscribeOptions::new(
///         ["sim/flightmodel/position/latitude", "sim/flightmodel/position/longitude"],
///         |values| println!("lat={} lon={}", values[0], values[1]),
///     )
///     .with_min_delta_time(0.5)
///     .with_precision(0.0001),
/// )?;
/// ```
pub struct SubscribeOptions {
    datarefs: Vec<String>,
    min_delta_time: f64,
    precision: f64,
    callback: DatarefCallback,
}

impl SubscribeOptions {
    /// Creates options watching the given datarefs.
    ///
    /// Defaults: unthrottled, precision hint 0 (server default
    /// granularity).
    #[must_use]
    pub fn new<I, S>(datarefs: I, callback: impl FnMut(&[f64]) + Send + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datarefs: datarefs.into_iter().map(Into::into).collect(),
            min_delta_time: 0.0,
            precision: 0.0,
            callback: Box::new(callback),
        }
    }

    /// Sets the minimum seconds between callback invocations.
    #[inline]
    #[must_use]
    pub fn with_min_delta_time(mut self, seconds: f64) -> Self {
        self.min_delta_time = seconds;
        self
    }

    /// Sets the quantization granularity hint forwarded to the server.
    #[inline]
    #[must_use]
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// Handle to one instrument link.
///
/// Cloning is cheap; all clones share the same session, cache,
/// subscriptions, and callbacks. The link outlives dropped handles and is
/// torn down with [`shutdown`].
///
/// Callbacks are invoked with none of the client's internal locks held,
/// so they may call back into the client (read values, subscribe,
/// register further callbacks).
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use simlink::{Client, ClientConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::connect(
///         ClientConfig::auto(),
///         json!({"instrument": "pfd"}),
///         |client| {
///             client
///                 .subscribe_datarefs(
///                     |values| println!("airspeed: {}", values[0]),
///                     0.0,
///                     &["sim/flightmodel/position/indicated_airspeed"],
///                 )
///                 .expect("subscribe");
///         },
///     );
///     // ... run the instrument ...
///     client.shutdown();
/// }
/// ```
///
/// [`shutdown`]: Client::shutdown
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &*self.inner.session.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Connects to the instrument server and returns a handle.
    ///
    /// The connection is established in the background; `on_ready` is
    /// invoked after every successful handshake, including the ones
    /// following reconnects and redirects. Subscriptions and command
    /// callback registrations belong in `on_ready` or later, since every
    /// outbound message requires the session identifier.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn connect(
        config: ClientConfig,
        metadata: Value,
        on_ready: impl FnMut(&Client) + Send + 'static,
    ) -> Self {
        Self::connect_with(config, metadata, on_ready, Arc::new(WsConnector))
    }

    /// Connects through a custom [`Connector`].
    ///
    /// The seam for tests and for non-WebSocket transports.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn connect_with(
        config: ClientConfig,
        metadata: Value,
        on_ready: impl FnMut(&Client) + Send + 'static,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientInner::new(command_tx));

        let core = ClientCore::new(
            Arc::clone(&inner),
            connector,
            command_rx,
            config,
            metadata,
            Box::new(on_ready),
        );
        tokio::spawn(core.run());

        Self { inner }
    }

    /// Creates a handle over existing shared state.
    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Client - Session
// ============================================================================

impl Client {
    /// Returns the current session identifier, if the handshake completed.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.session.lock().clone()
    }

    /// Returns `true` if a session is active.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// Tears down the link and terminates the event loop.
    pub fn shutdown(&self) {
        let _ = self.inner.command_tx.send(LoopCommand::Shutdown);
    }
}

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Subscribes to datarefs with the default precision hint.
    ///
    /// `callback` receives positional values in the declared dataref
    /// order; `min_delta_time` throttles invocations (0 = unthrottled).
    /// The subscription lives for the client and survives reconnects and
    /// redirects; there is no unsubscribe operation.
    ///
    /// The subscription is registered locally even when sending the
    /// `SUBSCRIBE` request fails, matching the reference client; the
    /// returned error then reports the send failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn subscribe_datarefs(
        &self,
        callback: impl FnMut(&[f64]) + Send + 'static,
        min_delta_time: f64,
        datarefs: &[&str],
    ) -> Result<SubscriptionId> {
        self.subscribe_datarefs_with_precision(
            SubscribeOptions::new(datarefs.iter().copied(), callback)
                .with_min_delta_time(min_delta_time)
                .with_precision(DEFAULT_PRECISION),
        )
    }

    /// Subscribes to datarefs with an explicit precision hint.
    ///
    /// The precision is a quantization granularity the server may use to
    /// reduce update volume; it is forwarded verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn subscribe_datarefs_with_precision(
        &self,
        options: SubscribeOptions,
    ) -> Result<SubscriptionId> {
        let SubscribeOptions {
            datarefs,
            min_delta_time,
            precision,
            callback,
        } = options;

        let id = self.inner.dispatch.lock().register(
            datarefs.clone(),
            min_delta_time,
            callback,
            Instant::now(),
        );

        self.send_message(OutboundMessage::Subscribe {
            precision,
            data: datarefs,
        })?;

        Ok(id)
    }

    /// Returns the last-known value of a dataref, if any update or
    /// subscription ever touched it.
    #[must_use]
    pub fn last_known(&self, dataref: &str) -> Option<f64> {
        self.inner.dispatch.lock().last_known(dataref)
    }
}

// ============================================================================
// Client - One-shot reads
// ============================================================================

impl Client {
    /// Reads datarefs once; `callback` receives the raw response payload.
    ///
    /// Responses are correlated positionally: concurrent one-shot requests
    /// resolve strictly in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn get_datarefs(
        &self,
        datarefs: &[&str],
        callback: impl FnOnce(Value) + Send + 'static,
    ) -> Result<()> {
        self.inner.once_queue.lock().push(Box::new(callback));

        self.send_message(OutboundMessage::GetOnce {
            data: to_strings(datarefs),
        })
    }
}

// ============================================================================
// Client - Dataref writes
// ============================================================================

impl Client {
    /// Writes a scalar dataref.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn set_dataref(&self, dataref: &str, value_type: DatarefType, value: f64) -> Result<()> {
        self.send_message(OutboundMessage::Set {
            dataref: dataref.to_string(),
            data: value.to_string(),
            value_type,
        })
    }

    /// Writes a slice of an array dataref starting at `offset`.
    ///
    /// Scalar type tags are promoted to their array variants.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for element types without an array
    ///   variant
    /// - [`Error::MissingIdentifier`] before the handshake completes
    pub fn set_array_dataref(
        &self,
        dataref: &str,
        value_type: DatarefType,
        values: Vec<f64>,
        offset: usize,
    ) -> Result<()> {
        let value_type = value_type.into_array_type()?;

        self.send_message(OutboundMessage::SetArray {
            dataref: dataref.to_string(),
            value_type,
            data: values,
            offset,
        })
    }
}

// ============================================================================
// Client - Commands
// ============================================================================

impl Client {
    /// Registers a callback invoked whenever the named simulator command
    /// fires.
    ///
    /// Returns the identifier used to remove exactly this callback.
    /// Command callbacks do not survive server-initiated redirects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn register_command_callback(
        &self,
        command: &str,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<CallbackId> {
        let id = self
            .inner
            .registry
            .lock()
            .register(command, Box::new(callback));

        self.send_message(OutboundMessage::RegisterCommandCallback {
            data: command.to_string(),
        })?;

        Ok(id)
    }

    /// Removes one previously registered command callback.
    pub fn remove_command_callback(&self, command: &str, id: CallbackId) {
        self.inner.registry.lock().remove(command, id);
    }

    /// Fires a simulator command once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn run_command(&self, name: &str) -> Result<()> {
        self.send_command_phase(name, CommandPhase::Once)
    }

    /// Alias for [`run_command`](Client::run_command).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    #[inline]
    pub fn command_once(&self, name: &str) -> Result<()> {
        self.run_command(name)
    }

    /// Begins holding a simulator command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn command_begin(&self, name: &str) -> Result<()> {
        self.send_command_phase(name, CommandPhase::Begin)
    }

    /// Releases a held simulator command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn command_end(&self, name: &str) -> Result<()> {
        self.send_command_phase(name, CommandPhase::End)
    }

    /// Holds a command for a duration, releasing it from a background
    /// timer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes. A failure to release after the delay is logged, not
    /// returned.
    pub fn command_for_duration(&self, name: &str, duration: Duration) -> Result<()> {
        self.command_begin(name)?;

        let client = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(e) = client.command_end(&name) {
                warn!(command = %name, error = %e, "Failed to release held command");
            }
        });

        Ok(())
    }

    fn send_command_phase(&self, name: &str, phase: CommandPhase) -> Result<()> {
        self.send_message(OutboundMessage::RunCommand {
            data: name.to_string(),
            phase,
        })
    }
}

// ============================================================================
// Client - Reposition
// ============================================================================

impl Client {
    /// Repositions the aircraft to an airport by ICAO code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    pub fn move_to_airport(&self, icao: &str) -> Result<()> {
        self.send_message(OutboundMessage::Reposition {
            data: RepositionTarget::Airport(icao.to_string()),
        })
    }

    /// Repositions the aircraft to an explicit position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingIdentifier`] before the handshake
    /// completes.
    #[allow(clippy::too_many_arguments)]
    pub fn move_to_position(
        &self,
        lat: f64,
        lon: f64,
        hdg: f64,
        alt: f64,
        speed: f64,
        fast: bool,
    ) -> Result<()> {
        self.send_message(OutboundMessage::Reposition {
            data: RepositionTarget::Position(Position {
                lat,
                lon,
                hdg,
                alt,
                speed,
                fast,
            }),
        })
    }
}

// ============================================================================
// Client - Event handlers
// ============================================================================

impl Client {
    /// Registers a handler for a named client event.
    ///
    /// Each event holds at most one handler; registering again replaces
    /// the previous one.
    pub fn on(&self, event: ClientEvent) {
        let mut handlers = self.inner.handlers.lock();
        match event {
            ClientEvent::LoadingStateChanges(callback) => {
                handlers.loading_state = Some(Arc::new(Mutex::new(callback)));
            }
            ClientEvent::ConnectionTimeout(callback) => {
                handlers.timeout = Some(Arc::new(Mutex::new(callback)));
            }
        }
    }

    /// Registers the handler for user-visible server notices, such as the
    /// trial subscription limit banner emitted during the handshake.
    /// Distinct from ordinary logging.
    pub fn set_notice_handler(&self, callback: impl FnMut(&str) + Send + 'static) {
        self.inner.handlers.lock().notice = Some(Arc::new(Mutex::new(Box::new(callback))));
    }
}

// ============================================================================
// Client - Outbound envelope
// ============================================================================

impl Client {
    /// Builds and queues an outbound envelope.
    ///
    /// Every message must carry the session identifier; invoking the
    /// client before handshake completion is a programmer fault and fails
    /// loudly rather than degrading silently.
    fn send_message(&self, payload: OutboundMessage) -> Result<()> {
        let session = self
            .inner
            .session
            .lock()
            .clone()
            .ok_or(Error::MissingIdentifier)?;

        let text = Envelope::new(session, payload).to_wire()?;

        self.inner
            .command_tx
            .send(LoopCommand::SendText(text))
            .map_err(|_| Error::ClientClosed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Client over a bare channel, with no event loop behind it.
    fn detached_client() -> (Client, UnboundedReceiver<LoopCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let client = Client::from_inner(Arc::new(ClientInner::new(command_tx)));
        (client, command_rx)
    }

    fn assign_session(client: &Client, token: &str) {
        *client.inner.session.lock() = Some(SessionId::new(token));
    }

    fn queued_wire(rx: &mut UnboundedReceiver<LoopCommand>) -> Value {
        match rx.try_recv().expect("a frame was queued") {
            LoopCommand::SendText(text) => serde_json::from_str(&text).expect("valid json"),
            _ => panic!("expected SendText"),
        }
    }

    #[test]
    fn test_send_before_handshake_fails_loudly() {
        let (client, _rx) = detached_client();

        let err = client
            .set_dataref("sim/test", DatarefType::Int, 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier));
    }

    #[test]
    fn test_set_dataref_wire_format() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client
            .set_dataref("sim/cockpit/autopilot/altitude", DatarefType::Float, 8000.0)
            .expect("send");

        let value = queued_wire(&mut rx);
        assert_eq!(value["id"], "tok");
        assert_eq!(value["command"], "SET");
        assert_eq!(value["data"], "8000");
        assert_eq!(value["type"], "FLOAT");
    }

    #[test]
    fn test_set_array_dataref_rejects_double() {
        let (client, _rx) = detached_client();
        assign_session(&client, "tok");

        let err = client
            .set_array_dataref("sim/test", DatarefType::Double, vec![1.0], 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_set_array_dataref_promotes_int() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client
            .set_array_dataref("sim/test", DatarefType::Int, vec![1.0, 2.0], 4)
            .expect("send");

        let value = queued_wire(&mut rx);
        assert_eq!(value["command"], "ASET");
        assert_eq!(value["type"], "INT_ARRAY");
        assert_eq!(value["offset"], 4);
    }

    #[test]
    fn test_subscribe_registers_even_before_handshake() {
        let (client, _rx) = detached_client();

        // No identifier yet: the send fails but the local registration
        // persists, matching the reference client.
        let result = client.subscribe_datarefs(|_| {}, 0.0, &["sim/a"]);
        assert!(matches!(result, Err(Error::MissingIdentifier)));
        assert_eq!(client.last_known("sim/a"), Some(0.0));
    }

    #[test]
    fn test_subscribe_wire_format_uses_default_precision() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client
            .subscribe_datarefs(|_| {}, 0.5, &["sim/a", "sim/b"])
            .expect("subscribe");

        let value = queued_wire(&mut rx);
        assert_eq!(value["command"], "SUBSCRIBE");
        assert_eq!(value["precision"], 0.01);
        assert_eq!(value["data"], json!(["sim/a", "sim/b"]));
    }

    #[test]
    fn test_subscribe_with_precision_forwards_verbatim() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client
            .subscribe_datarefs_with_precision(
                SubscribeOptions::new(["sim/a"], |_| {}).with_precision(0.0001),
            )
            .expect("subscribe");

        let value = queued_wire(&mut rx);
        assert_eq!(value["precision"], 0.0001);
    }

    #[test]
    fn test_register_command_callback_sends_registration() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        let id = client
            .register_command_callback("sim/flight_controls/gear_toggle", || {})
            .expect("register");

        let value = queued_wire(&mut rx);
        assert_eq!(value["command"], "REGISTER_CMD_CALLBACK");
        assert_eq!(value["data"], "sim/flight_controls/gear_toggle");

        client.remove_command_callback("sim/flight_controls/gear_toggle", id);
        assert!(client.inner.registry.lock().is_empty());
    }

    #[test]
    fn test_command_phases_wire_values() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client.run_command("cmd").expect("send");
        assert_eq!(queued_wire(&mut rx)["type"], 0);

        client.command_begin("cmd").expect("send");
        assert_eq!(queued_wire(&mut rx)["type"], 1);

        client.command_end("cmd").expect("send");
        assert_eq!(queued_wire(&mut rx)["type"], 2);
    }

    #[tokio::test]
    async fn test_command_for_duration_sends_begin_then_end() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client
            .command_for_duration("cmd", Duration::from_millis(10))
            .expect("send");

        assert_eq!(queued_wire(&mut rx)["type"], 1);

        let end = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("end frame within deadline")
            .expect("channel open");
        match end {
            LoopCommand::SendText(text) => {
                let value: Value = serde_json::from_str(&text).expect("valid json");
                assert_eq!(value["type"], 2);
            }
            _ => panic!("expected SendText"),
        }
    }

    #[test]
    fn test_move_to_airport_wire_format() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client.move_to_airport("KSEA").expect("send");

        let value = queued_wire(&mut rx);
        assert_eq!(value["command"], "REPOSITION");
        assert_eq!(value["data"], "KSEA");
    }

    #[test]
    fn test_get_datarefs_enqueues_callback() {
        let (client, mut rx) = detached_client();
        assign_session(&client, "tok");

        client.get_datarefs(&["sim/a"], |_| {}).expect("send");

        assert_eq!(client.inner.once_queue.lock().len(), 1);
        let value = queued_wire(&mut rx);
        assert_eq!(value["command"], "GET_ONCE");
        assert_eq!(value["data"], json!(["sim/a"]));
    }

    #[test]
    fn test_event_handler_registration_replaces() {
        let (client, _rx) = detached_client();

        client.on(ClientEvent::ConnectionTimeout(Box::new(|| {})));
        client.on(ClientEvent::ConnectionTimeout(Box::new(|| {})));
        client.on(ClientEvent::LoadingStateChanges(Box::new(|_| {})));
        client.set_notice_handler(|_| {});

        let handlers = client.inner.handlers.lock();
        assert!(handlers.timeout.is_some());
        assert!(handlers.loading_state.is_some());
        assert!(handlers.notice.is_some());
    }

    #[test]
    fn test_shutdown_then_send_reports_closed() {
        let (client, rx) = detached_client();
        assign_session(&client, "tok");
        drop(rx);

        let err = client.run_command("cmd").unwrap_err();
        assert!(matches!(err, Error::ClientClosed));
    }
}
