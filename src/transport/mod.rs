//! Transport layer for event bus communication
//!
//! This module provides the transport abstraction the connection manager is
//! written against, plus the WebSocket implementation used in production.
//! The manager never sees a native socket callback: it drives a
//! [`TransportSocket`] from its own supervisor task.

use std::time::Duration;
use thiserror::Error;
use url::Url;

pub mod websocket;

pub use websocket::{WebSocketConnector, WebSocketSocket};

/// Opens physical duplex connections to the event bus
///
/// This trait enables dependency injection: production code uses
/// [`WebSocketConnector`], tests use `testing::MockConnector`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open one connection to `endpoint`
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn TransportSocket>, TransportError>;
}

/// One physical duplex connection carrying JSON text frames
#[async_trait::async_trait]
pub trait TransportSocket: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next inbound text frame.
    ///
    /// `Ok(None)` means the peer closed the connection cleanly. Must be
    /// cancel safe: the supervisor polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection, best effort
    async fn close(&mut self);
}

/// Transport failures
///
/// None of these ever reach subscribers; the connection manager records them
/// as `last_error` and schedules a reconnect.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection closed by peer (code {code}): {reason}")]
    ClosedByPeer { code: u16, reason: String },
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}
