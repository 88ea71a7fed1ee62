//! Pure reconnection policy for the event client
//!
//! The default is a fixed delay between attempts with unlimited retries. An
//! optional per-attempt backoff pattern and attempt limit can be configured.

use crate::config::{ConfigError, ReconnectSection};
use std::time::Duration;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum reconnect attempts between successful opens (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Per-attempt delays in milliseconds, tried in order
    pub backoff_pattern: Vec<u64>,
    /// Delay used when no pattern is set or the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: Vec::new(),
            sustained_delay: 5_000,
        }
    }
}

impl From<&ReconnectSection> for ReconnectConfig {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            backoff_pattern: section.backoff_pattern.clone(),
            sustained_delay: section.delay_ms,
        }
    }
}

impl ReconnectConfig {
    /// Fixed delay, unlimited attempts. Delays beyond `u64::MAX` ms saturate.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            sustained_delay: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }

    /// Delay in milliseconds before the given attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "reconnect.max_attempts must be greater than 0 or absent for unlimited"
                    .to_string(),
            ));
        }

        if self.sustained_delay == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.backoff_pattern.contains(&0) {
            return Err(ConfigError::InvalidConfig(
                "reconnect.backoff_pattern entries must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Wait `delay_ms`, then make attempt number `attempt`
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - disconnect or dispose requested
    AbortShutdownRequested,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}

/// Pure reconnection decision logic
pub struct ReconnectionPolicy;

impl ReconnectionPolicy {
    /// Decide whether and when to make the next attempt.
    ///
    /// `attempts_made` counts reconnect attempts since the last successful
    /// open; it is zero right after a live connection drops.
    pub fn should_attempt_reconnection(
        attempts_made: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if attempts_made >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let attempt = attempts_made + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.calculate_backoff_delay(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, None);
        assert!(config.backoff_pattern.is_empty());
        assert_eq!(config.sustained_delay, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let config = ReconnectConfig::default();
        for attempt in [1, 2, 5, 100] {
            assert_eq!(config.calculate_backoff_delay(attempt), 5_000);
        }
    }

    #[test]
    fn test_calculate_backoff_delay_with_pattern() {
        let config = ReconnectConfig {
            max_attempts: None,
            backoff_pattern: vec![250, 1_000, 2_500],
            sustained_delay: 5_000,
        };

        assert_eq!(config.calculate_backoff_delay(1), 250);
        assert_eq!(config.calculate_backoff_delay(2), 1_000);
        assert_eq!(config.calculate_backoff_delay(3), 2_500);

        // Pattern exhausted
        assert_eq!(config.calculate_backoff_delay(4), 5_000);
        assert_eq!(config.calculate_backoff_delay(100), 5_000);
    }

    #[test]
    fn test_fixed_delay_saturates() {
        assert_eq!(
            ReconnectConfig::fixed(Duration::from_millis(1_500)).sustained_delay,
            1_500
        );
        assert_eq!(
            ReconnectConfig::fixed(Duration::MAX).sustained_delay,
            u64::MAX
        );
    }

    #[test]
    fn test_should_attempt_reconnection() {
        let config = ReconnectConfig::default();

        let decision = ReconnectionPolicy::should_attempt_reconnection(0, &config, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay_ms: 5_000
            }
        );

        let decision = ReconnectionPolicy::should_attempt_reconnection(0, &config, true);
        assert_eq!(decision, ReconnectionDecision::AbortShutdownRequested);

        // Unlimited retries never abort
        let decision = ReconnectionPolicy::should_attempt_reconnection(10_000, &config, false);
        assert!(matches!(decision, ReconnectionDecision::Proceed { .. }));

        let limited = ReconnectConfig {
            max_attempts: Some(3),
            ..ReconnectConfig::default()
        };
        let decision = ReconnectionPolicy::should_attempt_reconnection(2, &limited, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 3,
                delay_ms: 5_000
            }
        );
        let decision = ReconnectionPolicy::should_attempt_reconnection(3, &limited, false);
        assert_eq!(decision, ReconnectionDecision::AbortMaxAttemptsExceeded);
    }

    #[test]
    fn test_validate() {
        let invalid = ReconnectConfig {
            max_attempts: Some(0),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = ReconnectConfig {
            sustained_delay: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = ReconnectConfig {
            backoff_pattern: vec![100, 0],
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let valid = ReconnectConfig {
            max_attempts: Some(10),
            backoff_pattern: vec![25, 50, 100, 250],
            sustained_delay: 250,
        };
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_from_section() {
        let section = ReconnectSection {
            delay_ms: 1_500,
            backoff_pattern: vec![10],
            max_attempts: Some(2),
        };
        let config = ReconnectConfig::from(&section);
        assert_eq!(config.sustained_delay, 1_500);
        assert_eq!(config.backoff_pattern, vec![10]);
        assert_eq!(config.max_attempts, Some(2));
    }
}
