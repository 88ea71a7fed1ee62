//! Mock transport for testing
//!
//! [`MockConnector`] stands in for [`crate::transport::WebSocketConnector`]. It
//! records every open, can be told to refuse or fail connections, and hands
//! out a [`MockSocketHandle`] per opened socket so tests can inject frames,
//! peer closes and transport errors and inspect what the client wrote.
//!
//! A socket counts as live from the moment it is opened until its `close()`
//! completes or it is dropped, whichever comes first.

use crate::protocol::{BusEvent, ControlFrame};
use crate::transport::{Connector, TransportError, TransportSocket};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ConnectorState {
    opened_endpoints: Vec<Url>,
    refuse: bool,
    fail_next: VecDeque<TransportError>,
    sockets: Vec<MockSocketHandle>,
    close_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct LiveSockets {
    current: usize,
    peak: usize,
}

/// Held by a socket while it is live
#[derive(Debug)]
struct LiveGuard(Arc<Mutex<LiveSockets>>);

impl LiveGuard {
    fn acquire(live: &Arc<Mutex<LiveSockets>>) -> Self {
        let mut counts = lock(live);
        counts.current += 1;
        counts.peak = counts.peak.max(counts.current);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut counts = lock(&self.0);
        counts.current = counts.current.saturating_sub(1);
    }
}

/// Mock connector for testing
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
    live: Arc<Mutex<LiveSockets>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every open fails until [`MockConnector::set_refuse`] is cleared
    pub fn refusing() -> Self {
        let connector = Self::new();
        connector.set_refuse(true);
        connector
    }

    pub fn set_refuse(&self, refuse: bool) {
        lock(&self.state).refuse = refuse;
    }

    /// Make the next open fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        lock(&self.state).fail_next.push_back(error);
    }

    /// Number of open attempts, successful or not
    pub fn open_count(&self) -> usize {
        lock(&self.state).opened_endpoints.len()
    }

    pub fn opened_endpoints(&self) -> Vec<Url> {
        lock(&self.state).opened_endpoints.clone()
    }

    /// Number of sockets successfully opened
    pub fn socket_count(&self) -> usize {
        lock(&self.state).sockets.len()
    }

    pub fn socket(&self, index: usize) -> Option<MockSocketHandle> {
        lock(&self.state).sockets.get(index).cloned()
    }

    pub fn latest_socket(&self) -> Option<MockSocketHandle> {
        lock(&self.state).sockets.last().cloned()
    }

    /// Make `close()` on sockets opened from now on take `delay`, like a close
    /// handshake waiting on the server
    pub fn set_close_delay(&self, delay: Duration) {
        lock(&self.state).close_delay = Some(delay);
    }

    /// Sockets opened and not yet closed or dropped
    pub fn live_sockets(&self) -> usize {
        lock(&self.live).current
    }

    /// Highest number of sockets that were live at the same time
    pub fn max_live_sockets(&self) -> usize {
        lock(&self.live).peak
    }

    /// Total pings written across every socket
    pub fn total_pings(&self) -> usize {
        lock(&self.state)
            .sockets
            .iter()
            .map(MockSocketHandle::ping_count)
            .sum()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn TransportSocket>, TransportError> {
        let mut state = lock(&self.state);
        state.opened_endpoints.push(endpoint.clone());

        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        if state.refuse {
            return Err(TransportError::ConnectionFailed(
                "Connection refused".to_string(),
            ));
        }

        let (mut socket, handle) = MockSocket::pair();
        socket.close_delay = state.close_delay;
        socket.live = Some(LiveGuard::acquire(&self.live));
        state.sockets.push(handle);
        Ok(Box::new(socket))
    }
}

#[derive(Debug)]
enum Inbound {
    Text(String),
    PeerClose,
    Error(TransportError),
}

#[derive(Debug, Default)]
struct SocketState {
    sent: Vec<String>,
    closed: bool,
}

/// Client side of a mock connection
#[derive(Debug)]
pub struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    state: Arc<Mutex<SocketState>>,
    close_delay: Option<Duration>,
    live: Option<LiveGuard>,
}

impl MockSocket {
    fn pair() -> (Self, MockSocketHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SocketState::default()));
        let socket = Self {
            inbound: rx,
            state: Arc::clone(&state),
            close_delay: None,
            live: None,
        };
        (socket, MockSocketHandle { inbound: tx, state })
    }
}

#[async_trait]
impl TransportSocket for MockSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(TransportError::SendFailed("socket is closed".to_string()));
        }
        state.sent.push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::PeerClose) | None => {
                lock(&self.state).closed = true;
                Ok(None)
            }
            Some(Inbound::Error(error)) => {
                lock(&self.state).closed = true;
                Err(error)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state).closed = true;
        self.live = None;
    }
}

/// Test-side handle to one mock socket ("the server")
#[derive(Debug, Clone)]
pub struct MockSocketHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    state: Arc<Mutex<SocketState>>,
}

impl MockSocketHandle {
    /// Deliver a raw text frame to the client
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Inbound::Text(text.into()));
    }

    pub fn push_json(&self, value: &Value) {
        self.push_text(value.to_string());
    }

    pub fn push_event(&self, event: &BusEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            self.push_text(text);
        }
    }

    pub fn push_pong(&self) {
        self.push_text(ControlFrame::Pong.to_json());
    }

    /// Close the connection from the server side
    pub fn close_from_peer(&self) {
        let _ = self.inbound.send(Inbound::PeerClose);
    }

    /// Break the connection with a receive error
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self
            .inbound
            .send(Inbound::Error(TransportError::ReceiveFailed(message.into())));
    }

    /// Every frame the client wrote, pings included
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    /// Frames the client wrote other than heartbeat pings
    pub fn sent_messages(&self) -> Vec<String> {
        let ping = ControlFrame::Ping.to_json();
        lock(&self.state)
            .sent
            .iter()
            .filter(|frame| **frame != ping)
            .cloned()
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        let ping = ControlFrame::Ping.to_json();
        lock(&self.state)
            .sent
            .iter()
            .filter(|frame| **frame == ping)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}
