//! Test helpers and utilities for integration tests

use eventbus_client::config::ClientConfig;
use eventbus_client::events::{EventClient, HeartbeatConfig, ReconnectConfig};
use eventbus_client::testing::MockConnector;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const TEST_ENDPOINT: &str = "ws://localhost:8000/ws/events";

/// Let spawned tasks run until they block again.
///
/// Only yields, so paused time does not auto-advance.
#[allow(dead_code)]
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time and let the woken tasks run
#[allow(dead_code)]
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Client over `connector` with default heartbeat and reconnect settings
#[allow(dead_code)]
pub fn test_client(connector: &MockConnector) -> EventClient {
    test_client_with(
        connector,
        HeartbeatConfig::default(),
        ReconnectConfig::default(),
    )
}

#[allow(dead_code)]
pub fn test_client_with(
    connector: &MockConnector,
    heartbeat: HeartbeatConfig,
    reconnect: ReconnectConfig,
) -> EventClient {
    EventClient::new(
        Url::parse(TEST_ENDPOINT).unwrap(),
        Arc::new(connector.clone()),
        heartbeat,
        reconnect,
    )
}

/// Configuration pointing at the test endpoint
#[allow(dead_code)]
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.client.endpoint = TEST_ENDPOINT.to_string();
    config
}
