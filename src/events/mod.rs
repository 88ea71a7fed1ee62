//! Realtime event bus client
//!
//! This module keeps one logical connection to the server-side event bus open
//! and fans typed events out to subscribers.
//!
//! # Architecture
//!
//! - [`client`] owns the connection: a supervisor task per connection
//!   generation opens the socket, runs the heartbeat and reconnects
//! - [`connection`] holds the observable connection state
//! - [`dispatcher`] classifies inbound frames and runs subscriber callbacks
//! - [`heartbeat`] and [`reconnect`] are the pure keep-alive and retry policies
//!
//! # Usage
//!
//! ```rust,no_run
//! use eventbus_client::config::ClientConfig;
//! use eventbus_client::events::{ConnectionState, EventClient};
//!
//! # tokio_test::block_on(async {
//! let client = EventClient::from_config(&ClientConfig::default())?;
//! let mut states = client.watch_state();
//!
//! client.subscribe("agent.status_changed", |payload| {
//!     println!("status: {payload}");
//!     Ok(())
//! });
//! client.connect();
//!
//! while states.changed().await.is_ok() {
//!     if *states.borrow() == ConnectionState::Connected {
//!         break;
//!     }
//! }
//! client.dispose();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod reconnect;

pub use client::EventClient;
pub use connection::{log_state_transition, ConnectionInfo, ConnectionState};
pub use dispatcher::{
    typed_handler, DispatchReport, EventDispatcher, EventHandler, FrameRoute, HandlerResult,
    SubscriptionId, SubscriptionRegistry,
};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL};
pub use reconnect::{ReconnectConfig, ReconnectionDecision, ReconnectionPolicy};
