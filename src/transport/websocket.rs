//! WebSocket transport backed by tokio-tungstenite
//!
//! Supports `ws://` and `wss://` endpoints. Only text frames carry bus
//! traffic; binary frames are dropped and protocol-level pings are answered
//! by tungstenite itself.

use super::{Connector, TransportError, TransportSocket};
use crate::protocol::redact_endpoint;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default timeout for the TCP + TLS + upgrade handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections to the event bus
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &Url) -> Result<Box<dyn TransportSocket>, TransportError> {
        debug!(endpoint = %redact_endpoint(endpoint), "Opening WebSocket connection");

        let attempt = tokio::time::timeout(self.connect_timeout, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?;

        let (stream, response) =
            attempt.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(status = %response.status(), "WebSocket upgrade accepted");

        Ok(Box::new(WebSocketSocket::new(stream)))
    }
}

/// A single open WebSocket connection
pub struct WebSocketSocket {
    stream: WsStream,
}

impl WebSocketSocket {
    fn new(stream: WsStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl TransportSocket for WebSocketSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(frame) => return close_outcome(frame),
                Message::Binary(data) => {
                    debug!(bytes = data.len(), "Dropping binary WebSocket frame");
                }
                // Protocol pings are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("WebSocket close handshake failed: {}", e);
        }
    }
}

/// Map a peer close frame to a clean close or a transport error
fn close_outcome(frame: Option<CloseFrame>) -> Result<Option<String>, TransportError> {
    match frame {
        None => Ok(None),
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Away) => Ok(None),
        Some(frame) => Err(TransportError::ClosedByPeer {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        }),
    }
}
