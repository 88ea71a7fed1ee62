//! Heartbeat tests under paused time
//!
//! The client pings every interval while connected. Pong tracking is opt-in:
//! by default unanswered pings never close the connection.

mod test_helpers;

use eventbus_client::events::{ConnectionState, HeartbeatConfig, ReconnectConfig};
use eventbus_client::protocol::ControlFrame;
use eventbus_client::testing::MockConnector;
use std::time::Duration;
use test_helpers::{advance, settle, test_client, test_client_with};

const INTERVAL: Duration = Duration::from_secs(30);

#[tokio::test(start_paused = true)]
async fn test_ping_sent_every_interval_while_connected() {
    let connector = MockConnector::new();
    let client = test_client(&connector);

    client.connect();
    settle().await;
    let socket = connector.latest_socket().unwrap();

    advance(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(socket.ping_count(), 0);

    advance(Duration::from_secs(1)).await;
    assert_eq!(socket.ping_count(), 1);
    assert_eq!(socket.sent_frames(), vec![ControlFrame::Ping.to_json()]);

    advance(INTERVAL).await;
    advance(INTERVAL).await;
    assert_eq!(socket.ping_count(), 3);
    assert_eq!(client.metrics().heartbeat.probes_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_pings_keep_connection_by_default() {
    let connector = MockConnector::new();
    let client = test_client(&connector);

    client.connect();
    settle().await;

    for _ in 0..10 {
        advance(INTERVAL).await;
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(connector.open_count(), 1);
    assert_eq!(connector.latest_socket().unwrap().ping_count(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_pong_is_consumed_not_dispatched() {
    let connector = MockConnector::new();
    let client = test_client(&connector);
    client.subscribe("pong", |_| panic!("control frames never reach subscribers"));

    client.connect();
    settle().await;
    connector.latest_socket().unwrap().push_pong();
    settle().await;

    let metrics = client.metrics();
    assert_eq!(metrics.heartbeat.pongs_received, 1);
    assert_eq!(metrics.events.handler_failures, 0);
    assert_eq!(client.last_event(), None);
}

#[tokio::test(start_paused = true)]
async fn test_missed_pongs_force_reconnect_when_enabled() {
    let connector = MockConnector::new();
    let client = test_client_with(
        &connector,
        HeartbeatConfig {
            interval: INTERVAL,
            max_missed_pongs: Some(2),
        },
        ReconnectConfig::default(),
    );

    client.connect();
    settle().await;
    let first = connector.latest_socket().unwrap();

    advance(INTERVAL).await;
    advance(INTERVAL).await;
    assert_eq!(first.ping_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connected);

    // Third tick with two pings outstanding
    advance(INTERVAL).await;
    assert!(first.is_closed());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let last_error = client.connection_info().last_error.unwrap();
    assert!(last_error.contains("No pong"), "{last_error}");

    advance(Duration::from_secs(5)).await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(connector.socket_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pong_resets_missed_count() {
    let connector = MockConnector::new();
    let client = test_client_with(
        &connector,
        HeartbeatConfig {
            interval: INTERVAL,
            max_missed_pongs: Some(1),
        },
        ReconnectConfig::default(),
    );

    client.connect();
    settle().await;
    let socket = connector.latest_socket().unwrap();

    for _ in 0..5 {
        advance(INTERVAL).await;
        socket.push_pong();
        settle().await;
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(socket.ping_count(), 5);
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_resumes_after_reconnect() {
    let connector = MockConnector::new();
    let client = test_client(&connector);

    client.connect();
    settle().await;
    connector.latest_socket().unwrap().close_from_peer();
    settle().await;

    advance(Duration::from_secs(4)).await;
    assert_eq!(connector.open_count(), 1);

    advance(Duration::from_secs(1)).await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connected);

    let second = connector.latest_socket().unwrap();
    advance(INTERVAL).await;
    assert_eq!(second.ping_count(), 1);
    assert_eq!(connector.socket(0).unwrap().ping_count(), 0);
}
