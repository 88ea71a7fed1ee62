//! Thread-safe metrics collection for one event client
//!
//! Counters are plain atomics updated from the supervisor task and from the
//! public client methods. Each [`crate::EventClient`] owns its own collector,
//! so independent clients never share numbers.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic counters for connection, heartbeat and dispatch activity
#[derive(Debug, Default)]
pub struct ClientMetrics {
    // Connection lifecycle
    connected: AtomicBool,
    connection_start_time: AtomicU64,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    disconnects: AtomicU64,
    reconnects_scheduled: AtomicU64,

    // Inbound traffic
    frames_received: AtomicU64,
    events_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    decode_failures: AtomicU64,

    // Heartbeat
    probes_sent: AtomicU64,
    pongs_received: AtomicU64,

    // Outbound traffic
    messages_sent: AtomicU64,
    sends_dropped: AtomicU64,
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The live connection ended, for any reason
    pub fn connection_lost(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_dispatched(&self, delivered: usize) {
        self.events_dispatched
            .fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub fn handler_failures(&self, failed: usize) {
        self.handler_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probe_sent(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pong_received(&self) {
        self.pongs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.connected.load(Ordering::Relaxed) {
            return 0;
        }
        match self.connection_start_time.load(Ordering::Relaxed) {
            0 => 0,
            start => now.saturating_sub(start),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            timestamp: now,
            connection: ConnectionMetrics {
                connected: self.connected.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
                connection_attempts: load(&self.connection_attempts),
                connections_established: load(&self.connections_established),
                connection_failures: load(&self.connection_failures),
                disconnects: load(&self.disconnects),
                reconnects_scheduled: load(&self.reconnects_scheduled),
            },
            events: EventMetrics {
                frames_received: load(&self.frames_received),
                events_dispatched: load(&self.events_dispatched),
                handler_failures: load(&self.handler_failures),
                decode_failures: load(&self.decode_failures),
            },
            heartbeat: HeartbeatMetrics {
                probes_sent: load(&self.probes_sent),
                pongs_received: load(&self.pongs_received),
            },
            outbound: OutboundMetrics {
                messages_sent: load(&self.messages_sent),
                sends_dropped: load(&self.sends_dropped),
            },
        }
    }
}

/// Serializable point-in-time copy of [`ClientMetrics`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Unix timestamp (seconds) when the snapshot was taken
    pub timestamp: u64,
    pub connection: ConnectionMetrics,
    pub events: EventMetrics,
    pub heartbeat: HeartbeatMetrics,
    pub outbound: OutboundMetrics,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionMetrics {
    pub connected: bool,
    pub connection_duration_seconds: u64,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub disconnects: u64,
    pub reconnects_scheduled: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventMetrics {
    pub frames_received: u64,
    /// Successful handler invocations
    pub events_dispatched: u64,
    pub handler_failures: u64,
    pub decode_failures: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HeartbeatMetrics {
    pub probes_sent: u64,
    pub pongs_received: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMetrics {
    pub messages_sent: u64,
    pub sends_dropped: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_collector_is_zeroed() {
        let snapshot = ClientMetrics::new().snapshot();
        assert!(!snapshot.connection.connected);
        assert_eq!(snapshot.connection.connection_attempts, 0);
        assert_eq!(snapshot.events.frames_received, 0);
        assert_eq!(snapshot.outbound.sends_dropped, 0);
    }

    #[test]
    fn test_connection_lifecycle_counters() {
        let metrics = ClientMetrics::new();

        metrics.connection_attempt();
        metrics.connection_failed();
        metrics.connection_attempt();
        metrics.connection_established();

        let snapshot = metrics.snapshot();
        assert!(snapshot.connection.connected);
        assert_eq!(snapshot.connection.connection_attempts, 2);
        assert_eq!(snapshot.connection.connection_failures, 1);
        assert_eq!(snapshot.connection.connections_established, 1);

        metrics.connection_lost();
        metrics.connection_lost();
        let snapshot = metrics.snapshot();
        assert!(!snapshot.connection.connected);
        assert_eq!(snapshot.connection.disconnects, 1);
        assert_eq!(snapshot.connection.connection_duration_seconds, 0);
    }

    #[test]
    fn test_event_and_heartbeat_counters() {
        let metrics = ClientMetrics::new();

        metrics.frame_received();
        metrics.frame_received();
        metrics.events_dispatched(3);
        metrics.handler_failures(1);
        metrics.decode_failure();
        metrics.probe_sent();
        metrics.pong_received();
        metrics.message_sent();
        metrics.send_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events.frames_received, 2);
        assert_eq!(snapshot.events.events_dispatched, 3);
        assert_eq!(snapshot.events.handler_failures, 1);
        assert_eq!(snapshot.events.decode_failures, 1);
        assert_eq!(snapshot.heartbeat.probes_sent, 1);
        assert_eq!(snapshot.heartbeat.pongs_received, 1);
        assert_eq!(snapshot.outbound.messages_sent, 1);
        assert_eq!(snapshot.outbound.sends_dropped, 1);
    }

    #[test]
    fn test_collectors_are_independent() {
        let a = ClientMetrics::new();
        let b = ClientMetrics::new();
        a.send_dropped();
        assert_eq!(a.snapshot().outbound.sends_dropped, 1);
        assert_eq!(b.snapshot().outbound.sends_dropped, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(ClientMetrics::new().snapshot()).unwrap();
        assert!(json["connection"]["connected"].is_boolean());
        assert!(json["heartbeat"]["probes_sent"].is_u64());
    }
}
