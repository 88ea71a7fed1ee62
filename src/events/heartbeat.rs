//! Application-level keep-alive for the bus connection
//!
//! While connected the client writes `{"type":"ping"}` every interval and the
//! server answers `{"type":"pong"}`. By default pongs only reset bookkeeping;
//! with `max_missed_pongs` set, a run of unanswered pings forces a reconnect.

use crate::config::{ConfigError, HeartbeatSection};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Default ping interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Unanswered pings tolerated before the connection is considered dead
    pub max_missed_pongs: Option<u32>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_missed_pongs: None,
        }
    }
}

impl From<&HeartbeatSection> for HeartbeatConfig {
    fn from(section: &HeartbeatSection) -> Self {
        Self {
            interval: Duration::from_millis(section.interval_ms),
            max_missed_pongs: section.max_missed_pongs,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "heartbeat.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_missed_pongs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "heartbeat.max_missed_pongs must be greater than 0 or absent".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the session should do on a heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Write a ping frame
    SendProbe,
    /// Too many pings went unanswered; drop the socket and reconnect
    ForceReconnect { missed: u32 },
}

/// Per-connection heartbeat bookkeeping
///
/// Created when a socket opens and dropped with the session, so a stale
/// monitor can never tick against a newer connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    outstanding: u32,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            outstanding: 0,
        }
    }

    /// Interval whose first tick fires one period after now
    pub fn ticker(&self) -> Interval {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    pub fn on_tick(&mut self) -> HeartbeatAction {
        if let Some(max) = self.config.max_missed_pongs {
            if self.outstanding >= max {
                return HeartbeatAction::ForceReconnect {
                    missed: self.outstanding,
                };
            }
        }
        self.outstanding = self.outstanding.saturating_add(1);
        HeartbeatAction::SendProbe
    }

    pub fn on_pong(&mut self) {
        self.outstanding = 0;
    }

    /// Pings sent since the last pong
    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }
}
