//! Wire message types for the event bus
//!
//! This module defines the frames exchanged with the server-side event bus:
//! the business event envelope and the ping/pong keep-alive pair.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Business event published by the server-side event bus
///
/// # Examples
/// ```
/// use eventbus_client::protocol::BusEvent;
/// use serde_json::json;
///
/// let frame = r#"{"event_type":"task.completed","payload":{"id":"t1"},"trace_id":"x","timestamp":"2024-01-01T00:00:00Z"}"#;
/// let event: BusEvent = serde_json::from_str(frame).unwrap();
/// assert_eq!(event.event_type, "task.completed");
/// assert_eq!(event.payload, json!({"id": "t1"}));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusEvent {
    /// Discriminator used to route the event to subscribers
    pub event_type: String,
    /// Opaque structured payload handed to subscribers
    #[serde(default)]
    pub payload: Value,
    /// Correlation id assigned by the publisher
    #[serde(default)]
    pub trace_id: String,
    /// Publish time as sent by the server
    #[serde(default)]
    pub timestamp: String,
}

impl BusEvent {
    /// Build an event with the current UTC time as timestamp
    pub fn new(event_type: impl Into<String>, payload: Value, trace_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            trace_id: trace_id.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Known event type, if the discriminator is one the dashboard understands
    pub fn known_type(&self) -> Option<KnownEventType> {
        self.event_type.parse().ok()
    }

    /// Deserialize the payload into a caller-defined shape
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Parse the timestamp.
    ///
    /// Accepts RFC 3339 as well as naive ISO-8601 without an offset
    /// (`2024-01-01T00:00:00.123456`), which is interpreted as UTC.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Event types emitted by the agent backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownEventType {
    #[serde(rename = "message.received")]
    MessageReceived,
    #[serde(rename = "agent.thinking")]
    AgentThinking,
    #[serde(rename = "tool.invoked")]
    ToolInvoked,
    #[serde(rename = "task.completed")]
    TaskCompleted,
}

impl KnownEventType {
    pub const ALL: [KnownEventType; 4] = [
        KnownEventType::MessageReceived,
        KnownEventType::AgentThinking,
        KnownEventType::ToolInvoked,
        KnownEventType::TaskCompleted,
    ];

    /// Wire name of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownEventType::MessageReceived => "message.received",
            KnownEventType::AgentThinking => "agent.thinking",
            KnownEventType::ToolInvoked => "tool.invoked",
            KnownEventType::TaskCompleted => "task.completed",
        }
    }
}

impl fmt::Display for KnownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {s}"))
    }
}

/// Transport-layer control frames (`{"type": "ping"}` / `{"type": "pong"}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Ping,
    Pong,
}

impl ControlFrame {
    /// Encode the frame as JSON text
    pub fn to_json(&self) -> String {
        match self {
            ControlFrame::Ping => r#"{"type":"ping"}"#.to_string(),
            ControlFrame::Pong => r#"{"type":"pong"}"#.to_string(),
        }
    }
}
