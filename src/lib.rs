//! Event Bus Client - Rust Implementation
//!
//! A realtime client for the agent platform's server-side event bus.
//!
//! # Overview
//!
//! This crate keeps one persistent WebSocket connection to the event bus and
//! distributes typed events to in-process subscribers:
//! - Wire frame types and endpoint handling
//! - WebSocket transport behind an injectable connector
//! - Application-level ping/pong heartbeat
//! - Fixed-delay reconnection with optional backoff and attempt limits
//! - Per-event-type subscriber registry with isolated callbacks
//!
//! # Quick Start
//!
//! ```rust
//! use eventbus_client::protocol::{BusEvent, ControlFrame, KnownEventType};
//! use serde_json::json;
//!
//! let event = BusEvent::new(
//!     KnownEventType::TaskCompleted.as_str(),
//!     json!({"task_id": "t-42"}),
//!     "trace-1",
//! );
//! assert_eq!(event.known_type(), Some(KnownEventType::TaskCompleted));
//!
//! // Frames travel as JSON text
//! let frame = serde_json::to_string(&event).unwrap();
//! assert!(frame.contains("task.completed"));
//! assert_eq!(ControlFrame::Ping.to_json(), r#"{"type":"ping"}"#);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::*;
pub use error::{ClientError, ClientResult};
pub use events::{ConnectionInfo, ConnectionState, EventClient, SubscriptionId};
pub use protocol::*;
pub use transport::{Connector, TransportError, TransportSocket, WebSocketConnector};
