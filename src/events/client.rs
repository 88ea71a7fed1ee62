//! Connection manager: supervisor task and public client handle
//!
//! [`EventClient`] owns one logical connection to the event bus. A supervisor
//! task per connection generation opens the socket, runs the heartbeat,
//! routes inbound frames to subscribers and schedules reconnects. Public
//! methods are synchronous; everything they change is guarded by one lock and
//! a generation counter, so work left over from a torn-down connection is
//! discarded instead of leaking into the next one.

use super::connection::{log_state_transition, ConnectionInfo, ConnectionState};
use super::dispatcher::{
    typed_handler, EventDispatcher, FrameRoute, HandlerResult, SubscriptionId,
    SubscriptionRegistry,
};
use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use super::reconnect::{ReconnectConfig, ReconnectionDecision, ReconnectionPolicy};
use crate::config::ClientConfig;
use crate::error::{sanitize_error_message, ClientError, ClientResult};
use crate::observability::{ClientMetrics, MetricsSnapshot};
use crate::protocol::{redact_endpoint, BusEvent, ControlFrame};
use crate::transport::{Connector, TransportError, TransportSocket, WebSocketConnector};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;
use uuid::Uuid;

/// Realtime event bus client
///
/// Cheap to clone; all clones drive the same connection. When the last clone
/// is dropped the client is disposed.
///
/// # Examples
///
/// ```rust,no_run
/// use eventbus_client::config::ClientConfig;
/// use eventbus_client::EventClient;
///
/// # tokio_test::block_on(async {
/// let client = EventClient::from_config(&ClientConfig::default())?;
///
/// client.subscribe("task.completed", |payload| {
///     println!("task done: {payload}");
///     Ok(())
/// });
/// client.connect();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone)]
pub struct EventClient {
    inner: Arc<ClientInner>,
    _owner: Arc<OwnerGuard>,
}

/// Disposes the client when the last user handle goes away. The supervisor
/// task only holds `ClientInner`, so it never keeps this alive.
struct OwnerGuard(Arc<ClientInner>);

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

struct ClientInner {
    id: Uuid,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    heartbeat: HeartbeatConfig,
    reconnect: ReconnectConfig,
    registry: SubscriptionRegistry,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    last_event_tx: watch::Sender<Option<BusEvent>>,
    metrics: ClientMetrics,
}

/// Mutable connection bookkeeping, guarded by `ClientInner::shared`
struct Shared {
    /// Bumped by every disconnect/dispose; stale supervisors compare against it
    generation: u64,
    /// Outbound queue of the live socket, present only while connected
    outbound: Option<mpsc::UnboundedSender<String>>,
    last_opened_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    reconnect_attempts: u32,
    supervisor: Option<Supervisor>,
    /// Supervisor of a torn-down generation that may still be closing its socket
    retired: Option<JoinHandle<()>>,
}

struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Upper bound on waiting for a torn-down connection to finish closing
const RETIRED_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How a connected session ended
enum SessionEnd {
    /// disconnect()/dispose() was called
    Shutdown,
    /// The connection generation moved on while the session was running
    Stale,
    /// The socket closed or failed; reason is absent for a clean close
    Lost(Option<String>),
}

impl EventClient {
    /// Build a client from configuration using the WebSocket transport
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let connector = Arc::new(WebSocketConnector::new(config.connect_timeout()));
        Self::with_connector(config, connector)
    }

    /// Build a client from configuration over a caller-supplied transport
    pub fn with_connector(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let endpoint = config.resolve_endpoint()?;
        Ok(Self::new(
            endpoint,
            connector,
            HeartbeatConfig::from(&config.heartbeat),
            ReconnectConfig::from(&config.reconnect),
        ))
    }

    pub fn new(
        endpoint: Url,
        connector: Arc<dyn Connector>,
        heartbeat: HeartbeatConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (last_event_tx, _) = watch::channel(None);

        let inner = Arc::new(ClientInner {
            id: Uuid::new_v4(),
            endpoint,
            connector,
            heartbeat,
            reconnect,
            registry: SubscriptionRegistry::new(),
            shared: Mutex::new(Shared {
                generation: 0,
                outbound: None,
                last_opened_at: None,
                last_error: None,
                reconnect_attempts: 0,
                supervisor: None,
                retired: None,
            }),
            state_tx,
            last_event_tx,
            metrics: ClientMetrics::new(),
        });

        debug!(
            client_id = %inner.id,
            endpoint = %redact_endpoint(&inner.endpoint),
            "Event client created"
        );

        Self {
            _owner: Arc::new(OwnerGuard(Arc::clone(&inner))),
            inner,
        }
    }

    /// Start connecting. Returns immediately; requires a Tokio runtime.
    ///
    /// No-op while connecting or connected, and on a disposed client. If a
    /// reconnect delay is pending it is cut short.
    pub fn connect(&self) {
        ClientInner::connect(&self.inner);
    }

    /// Cancel any pending reconnect and heartbeat and drop the socket.
    ///
    /// Once this returns no handler runs for frames of the previous
    /// connection. Called from another thread while a fan-out is in progress,
    /// the handler already running finishes but none after it is invoked.
    /// The client may be connected again later.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Disconnect for good and drop every subscription
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Serialize `message` as JSON and queue it on the live socket.
    ///
    /// Returns false (and drops the message) unless connected.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        self.try_send(message).is_ok()
    }

    /// Like [`EventClient::send`], but says why the message was dropped.
    ///
    /// Fails with [`ClientError::Serialization`] if `message` cannot be encoded
    /// and with [`ClientError::Transport`] unless connected.
    pub fn try_send<T: Serialize + ?Sized>(&self, message: &T) -> ClientResult<()> {
        let text = serde_json::to_string(message).map_err(|e| {
            warn!("Dropping outbound message that failed to serialize: {}", e);
            self.inner.metrics.send_dropped();
            ClientError::from(e)
        })?;
        self.inner.send_text(text)
    }

    /// Queue a pre-encoded text frame on the live socket
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.inner.send_text(text.into()).is_ok()
    }

    /// Register `handler` for events of `event_type`
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(event_type, Arc::new(handler))
    }

    /// Register a handler that receives the payload decoded as `T`
    pub fn subscribe_typed<T, F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner
            .registry
            .subscribe(event_type, typed_handler(handler))
    }

    /// Remove one handler, or all handlers for `event_type` when `id` is None.
    /// Returns how many were removed.
    pub fn unsubscribe(&self, event_type: &str, id: Option<SubscriptionId>) -> usize {
        self.inner.registry.unsubscribe(event_type, id)
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.inner.registry.handler_count(event_type)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Most recent event received, if any
    pub fn last_event(&self) -> Option<BusEvent> {
        self.inner.last_event_tx.borrow().clone()
    }

    pub fn watch_last_event(&self) -> watch::Receiver<Option<BusEvent>> {
        self.inner.last_event_tx.subscribe()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let shared = self.inner.lock_shared();
        ConnectionInfo {
            state: self.inner.state(),
            endpoint: redact_endpoint(&self.inner.endpoint),
            last_opened_at: shared.last_opened_at,
            last_error: shared.last_error.clone(),
            reconnect_attempts: shared.reconnect_attempts,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Endpoint with credentials masked
    pub fn endpoint(&self) -> String {
        redact_endpoint(&self.inner.endpoint)
    }

    /// Instance id used to correlate log lines
    pub fn id(&self) -> Uuid {
        self.inner.id
    }
}

impl fmt::Debug for EventClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventClient")
            .field("id", &self.inner.id)
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

impl ClientInner {
    // Handlers never run under this lock, so a poisoned guard is still usable.
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Publish a state change. Callers hold the shared lock.
    fn transition(&self, to: ConnectionState, reason: Option<&str>) {
        let from = self.state();
        if from == to {
            return;
        }
        self.state_tx.send_replace(to);
        log_state_transition(from, to, reason);
    }

    fn connect(self: &Arc<Self>) {
        let mut shared = self.lock_shared();
        let state = self.state();

        if state.is_terminal() {
            warn!(client_id = %self.id, "connect() called on a disposed client, ignoring");
            return;
        }
        if state.is_connecting_or_connected() {
            debug!(client_id = %self.id, %state, "connect() ignored, already {}", state);
            return;
        }

        if let Some(supervisor) = shared.supervisor.as_ref() {
            if !supervisor.handle.is_finished() {
                // Reconnect delay pending
                self.transition(ConnectionState::Connecting, None);
                supervisor.wake.notify_one();
                return;
            }
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("connect() requires a Tokio runtime: {}", e);
                return;
            }
        };

        let generation = shared.generation;
        let previous = shared.retired.take();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        shared.reconnect_attempts = 0;
        self.transition(ConnectionState::Connecting, None);

        let span = crate::connection_span!(
            client_id = %self.id,
            generation,
            endpoint = %redact_endpoint(&self.endpoint)
        );
        let handle = runtime.spawn(
            supervise(
                Arc::clone(self),
                generation,
                previous,
                shutdown_rx,
                Arc::clone(&wake),
            )
            .instrument(span),
        );

        shared.supervisor = Some(Supervisor {
            shutdown_tx,
            wake,
            handle,
        });
    }

    fn disconnect(&self) {
        let mut shared = self.lock_shared();
        if self.state().is_terminal() {
            return;
        }
        self.teardown(&mut shared);
        self.transition(ConnectionState::Disconnected, None);
    }

    fn dispose(&self) {
        {
            let mut shared = self.lock_shared();
            if self.state().is_terminal() {
                return;
            }
            self.teardown(&mut shared);
            self.transition(ConnectionState::Closed, None);
        }
        // Handlers may own client clones; dropping them outside the lock
        self.registry.clear();
    }

    /// Invalidate the current generation and stop its supervisor
    fn teardown(&self, shared: &mut Shared) {
        shared.generation += 1;
        shared.outbound = None;
        shared.reconnect_attempts = 0;
        if let Some(supervisor) = shared.supervisor.take() {
            let _ = supervisor.shutdown_tx.send(true);
            // The next connect() waits on it before opening a socket
            shared.retired = Some(supervisor.handle);
        }
        if self.state() == ConnectionState::Connected {
            self.metrics.connection_lost();
        }
    }

    fn send_text(&self, text: String) -> ClientResult<()> {
        let shared = self.lock_shared();
        let state = self.state();

        let queued = match (&shared.outbound, state.can_send()) {
            (Some(outbound), true) => outbound.send(text).is_ok(),
            _ => false,
        };
        if !queued {
            warn!(%state, "Dropping outbound message, event bus is not connected");
            self.metrics.send_dropped();
            return Err(TransportError::SendFailed(format!("event bus is {state}")).into());
        }
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_shared().generation == generation
    }

    /// Move to Connecting for a new attempt; false if the generation is stale
    fn begin_attempt(&self, generation: u64) -> bool {
        let shared = self.lock_shared();
        if shared.generation != generation {
            return false;
        }
        self.metrics.connection_attempt();
        self.transition(ConnectionState::Connecting, None);
        true
    }

    fn mark_connected(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut shared = self.lock_shared();
        if shared.generation != generation {
            return false;
        }
        shared.outbound = Some(outbound);
        shared.last_error = None;
        shared.last_opened_at = Some(Utc::now());
        shared.reconnect_attempts = 0;
        self.metrics.connection_established();
        self.transition(ConnectionState::Connected, None);
        true
    }

    /// Record a lost connection or failed attempt.
    ///
    /// Returns reconnect attempts made since the last successful open, or None
    /// if the generation is stale.
    fn mark_disconnected(&self, generation: u64, reason: Option<&str>) -> Option<u32> {
        let mut shared = self.lock_shared();
        if shared.generation != generation {
            return None;
        }
        shared.outbound = None;
        if let Some(reason) = reason {
            shared.last_error = Some(sanitize_error_message(reason));
        }

        match self.state() {
            ConnectionState::Connected => self.metrics.connection_lost(),
            ConnectionState::Connecting => self.metrics.connection_failed(),
            _ => {}
        }
        self.transition(ConnectionState::Disconnected, shared.last_error.as_deref());
        Some(shared.reconnect_attempts)
    }

    fn record_reconnect_scheduled(&self, generation: u64, attempt: u32) -> bool {
        let mut shared = self.lock_shared();
        if shared.generation != generation {
            return false;
        }
        shared.reconnect_attempts = attempt;
        self.metrics.reconnect_scheduled();
        true
    }

    /// Attempt limit reached. Returns true if `connect()` was called in the
    /// meantime and the supervisor should keep going.
    fn give_up(&self, generation: u64) -> bool {
        let mut shared = self.lock_shared();
        if shared.generation != generation {
            return false;
        }
        if self.state() == ConnectionState::Connecting {
            shared.reconnect_attempts = 0;
            return true;
        }
        shared.supervisor = None;
        false
    }

    fn handle_frame(&self, generation: u64, text: &str, heartbeat: &mut HeartbeatMonitor) {
        self.metrics.frame_received();

        match EventDispatcher::classify(text) {
            FrameRoute::Pong => {
                heartbeat.on_pong();
                self.metrics.pong_received();
                debug!("Heartbeat pong received");
            }
            FrameRoute::NonEvent => {
                debug!("Ignoring frame without event_type");
            }
            FrameRoute::Malformed(reason) => {
                self.metrics.decode_failure();
                warn!("Dropping malformed frame: {}", reason);
            }
            FrameRoute::Event(event) => {
                if !self.is_current(generation) {
                    return;
                }
                self.last_event_tx.send_replace(Some(event.clone()));

                let span = crate::dispatch_span!(
                    event_type = %event.event_type,
                    trace_id = %event.trace_id
                );
                let _guard = span.enter();
                let report =
                    EventDispatcher::dispatch(&self.registry, &event, || self.is_current(generation));
                self.metrics.events_dispatched(report.delivered);
                self.metrics.handler_failures(report.failed);
            }
        }
    }
}

/// Wait for the previous generation's supervisor to release its socket.
///
/// A close handshake that outlives `RETIRED_CLOSE_GRACE` is aborted, which drops
/// the socket.
async fn await_retired(mut previous: JoinHandle<()>) {
    if tokio::time::timeout(RETIRED_CLOSE_GRACE, &mut previous)
        .await
        .is_err()
    {
        warn!(grace = ?RETIRED_CLOSE_GRACE, "Previous connection still closing, aborting it");
        previous.abort();
        let _ = previous.await;
    }
}

/// Connection supervisor for one generation
///
/// `previous` is the supervisor of the torn-down generation, if any. No socket
/// is opened until it has finished.
async fn supervise(
    inner: Arc<ClientInner>,
    generation: u64,
    previous: Option<JoinHandle<()>>,
    mut shutdown_rx: watch::Receiver<bool>,
    wake: Arc<Notify>,
) {
    if let Some(previous) = previous {
        await_retired(previous).await;
    }

    loop {
        if !inner.begin_attempt(generation) {
            break;
        }

        let opened = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            opened = inner.connector.open(&inner.endpoint) => opened,
        };

        let failure = match opened {
            Ok(socket) => match run_session(&inner, generation, socket, &mut shutdown_rx).await {
                SessionEnd::Shutdown | SessionEnd::Stale => break,
                SessionEnd::Lost(reason) => reason,
            },
            Err(e) => Some(e.to_string()),
        };

        let Some(attempts_made) = inner.mark_disconnected(generation, failure.as_deref()) else {
            break;
        };

        let shutdown_requested = *shutdown_rx.borrow();
        match ReconnectionPolicy::should_attempt_reconnection(
            attempts_made,
            &inner.reconnect,
            shutdown_requested,
        ) {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                if !inner.record_reconnect_scheduled(generation, attempt) {
                    break;
                }
                info!(attempt, delay_ms, "Reconnecting to event bus");

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = wake.notified() => debug!("Reconnect delay cut short"),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            ReconnectionDecision::AbortShutdownRequested => break,
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                if inner.give_up(generation) {
                    // Consume the wake-up that came with the connect() call
                    let _ = wake.notified().now_or_never();
                    continue;
                }
                warn!(
                    max_attempts = ?inner.reconnect.max_attempts,
                    "Giving up on the event bus until connect() is called again"
                );
                break;
            }
        }
    }

    debug!("Connection supervisor stopped");
}

/// Drive one open socket until it ends
async fn run_session(
    inner: &Arc<ClientInner>,
    generation: u64,
    mut socket: Box<dyn TransportSocket>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if !inner.mark_connected(generation, outbound_tx) {
        socket.close().await;
        return SessionEnd::Stale;
    }

    let mut heartbeat = HeartbeatMonitor::new(inner.heartbeat.clone());
    let mut ticker = heartbeat.ticker();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                socket.close().await;
                return SessionEnd::Shutdown;
            }
            _ = ticker.tick() => {
                if !inner.is_current(generation) {
                    socket.close().await;
                    return SessionEnd::Stale;
                }
                match heartbeat.on_tick() {
                    HeartbeatAction::SendProbe => {
                        if let Err(e) = socket.send_text(ControlFrame::Ping.to_json()).await {
                            return SessionEnd::Lost(Some(e.to_string()));
                        }
                        inner.metrics.probe_sent();
                        debug!(outstanding = heartbeat.outstanding(), "Heartbeat ping sent");
                    }
                    HeartbeatAction::ForceReconnect { missed } => {
                        socket.close().await;
                        return SessionEnd::Lost(Some(format!(
                            "No pong received for {missed} heartbeat pings"
                        )));
                    }
                }
            }
            Some(text) = outbound_rx.recv() => {
                if let Err(e) = socket.send_text(text).await {
                    return SessionEnd::Lost(Some(e.to_string()));
                }
                inner.metrics.message_sent();
            }
            inbound = socket.recv() => match inbound {
                Ok(Some(text)) => inner.handle_frame(generation, &text, &mut heartbeat),
                Ok(None) => return SessionEnd::Lost(None),
                Err(e) => return SessionEnd::Lost(Some(e.to_string())),
            },
        }
    }
}
