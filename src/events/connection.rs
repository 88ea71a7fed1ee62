//! Pure connection state management for the event client
//!
//! This module contains the connection state machine types and pure helper
//! functions over them. Nothing here touches the network.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Lifecycle state of the single bus connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no attempt in flight (initial state)
    Disconnected,
    /// A socket open is in flight
    Connecting,
    /// Socket open, heartbeat running, frames flowing
    Connected,
    /// Disposed; terminal
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether outbound frames may be handed to the transport
    pub fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether `connect()` has nothing to do in this state
    pub fn is_connecting_or_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    /// Endpoint with credentials masked
    pub endpoint: String,
    pub last_opened_at: Option<DateTime<Utc>>,
    /// Sanitized description of the most recent transport failure
    pub last_error: Option<String>,
    /// Connection attempts since the last successful open
    pub reconnect_attempts: u32,
}

/// Log a connection state transition (pure logging function)
pub fn log_state_transition(from: ConnectionState, to: ConnectionState, reason: Option<&str>) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("Event bus connection established");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => match reason {
            Some(reason) => warn!("Event bus connection lost: {}", reason),
            None => info!("Event bus connection closed"),
        },
        (ConnectionState::Connecting, ConnectionState::Disconnected) => match reason {
            Some(reason) => warn!("Event bus connection attempt failed: {}", reason),
            None => info!("Event bus connection attempt abandoned"),
        },
        (_, ConnectionState::Closed) => {
            info!("Event client disposed");
        }
        (from, to) if from == to => {
            debug!("Event bus connection state unchanged: {}", to);
        }
        _ => {
            info!("Event bus connection state: {} -> {}", from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_send_only_when_connected() {
        assert!(ConnectionState::Connected.can_send());
        assert!(!ConnectionState::Connecting.can_send());
        assert!(!ConnectionState::Disconnected.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connecting.is_connecting_or_connected());
        assert!(ConnectionState::Connected.is_connecting_or_connected());
        assert!(!ConnectionState::Disconnected.is_connecting_or_connected());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[test]
    fn test_log_state_transition_covers_all_pairs() {
        let states = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closed,
        ];
        for from in states {
            for to in states {
                log_state_transition(from, to, None);
                log_state_transition(from, to, Some("reset by peer"));
            }
        }
    }
}
