//! Configuration system for the event bus client
//!
//! Configuration is a TOML file with three sections (`[client]`, `[heartbeat]`,
//! `[reconnect]`). Every field has a default, so an empty file is valid and
//! describes a client for a locally running backend.

use crate::events::{HeartbeatConfig, ReconnectConfig};
use crate::protocol::{parse_endpoint, with_token, EndpointError, DEFAULT_ENDPOINT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Main client configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub client: ClientSection,
    pub heartbeat: HeartbeatSection,
    pub reconnect: ReconnectSection,
}

/// Client section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    /// Event bus endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    /// Environment variable holding the session token, sent as `?token=`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    /// Timeout for a single connection attempt in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token_env: None,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Heartbeat section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Ping interval in milliseconds (default: 30000)
    pub interval_ms: u64,
    /// Unanswered pings tolerated before forcing a reconnect (absent: never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_missed_pongs: Option<u32>,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_missed_pongs: None,
        }
    }
}

/// Reconnect section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectSection {
    /// Delay before reconnecting in milliseconds (default: 5000)
    pub delay_ms: u64,
    /// Per-attempt delays tried before settling on `delay_ms`
    pub backoff_pattern: Vec<u64>,
    /// Consecutive failed attempts before giving up (absent: unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            backoff_pattern: Vec::new(),
            max_attempts: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint(&self.client.endpoint)?;

        if self.client.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "client.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        HeartbeatConfig::from(&self.heartbeat).validate()?;
        ReconnectConfig::from(&self.reconnect).validate()?;

        Ok(())
    }

    /// Endpoint to connect to, with the session token appended when available.
    ///
    /// A configured but unset token variable is not an error: the client
    /// connects without credentials and the server decides.
    pub fn resolve_endpoint(&self) -> Result<Url, ConfigError> {
        let endpoint = parse_endpoint(&self.client.endpoint)?;

        match self.token() {
            Some(token) => Ok(with_token(&endpoint, &token)),
            None => {
                if let Some(name) = &self.client.token_env {
                    warn!(
                        token_env = %name,
                        "Token environment variable is not set, connecting without a token"
                    );
                }
                Ok(endpoint)
            }
        }
    }

    /// Session token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        Self::get_env_var_optional(self.client.token_env.as_ref()).filter(|t| !t.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.client.connect_timeout_ms)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.client.endpoint, "ws://localhost:8000/ws/events");
        assert_eq!(config.client.connect_timeout_ms, 10_000);
        assert_eq!(config.heartbeat.interval_ms, 30_000);
        assert_eq!(config.heartbeat.max_missed_pongs, None);
        assert_eq!(config.reconnect.delay_ms, 5_000);
        assert!(config.reconnect.backoff_pattern.is_empty());
        assert_eq!(config.reconnect.max_attempts, None);
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[client]
endpoint = "wss://bus.example.com/ws/events"
token_env = "EVENTBUS_WS_TOKEN"
connect_timeout_ms = 2500

[heartbeat]
interval_ms = 15000
max_missed_pongs = 3

[reconnect]
delay_ms = 10000
backoff_pattern = [500, 1000, 2000]
max_attempts = 10
"#;

        let config = ClientConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.client.endpoint, "wss://bus.example.com/ws/events");
        assert_eq!(
            config.client.token_env.as_deref(),
            Some("EVENTBUS_WS_TOKEN")
        );
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(config.heartbeat.max_missed_pongs, Some(3));
        assert_eq!(config.reconnect.backoff_pattern, vec![500, 1000, 2000]);
        assert_eq!(config.reconnect.max_attempts, Some(10));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ClientConfig::from_toml_str("[reconnect]\nmax_attempts = 2\n").unwrap();
        assert_eq!(config.reconnect.delay_ms, 5_000);
        assert_eq!(config.reconnect.max_attempts, Some(2));
        assert_eq!(config.heartbeat.interval_ms, 30_000);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = ClientConfig::from_toml_str("[client]\nendpoint = \"http://localhost/ws\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for content in [
            "[client]\nconnect_timeout_ms = 0\n",
            "[heartbeat]\ninterval_ms = 0\n",
            "[heartbeat]\nmax_missed_pongs = 0\n",
            "[reconnect]\ndelay_ms = 0\n",
            "[reconnect]\nmax_attempts = 0\n",
            "[reconnect]\nbackoff_pattern = [100, 0]\n",
        ] {
            let result = ClientConfig::from_toml_str(content);
            assert!(
                matches!(result, Err(ConfigError::InvalidConfig(_))),
                "expected rejection for {content:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = ClientConfig::from_toml_str("[heartbeat]\ninterval_ms = \"soon\"\n");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_resolve_endpoint_with_token() {
        let var = "EVENTBUS_CONFIG_TEST_TOKEN_SET";
        std::env::set_var(var, "tok123");

        let mut config = ClientConfig::default();
        config.client.token_env = Some(var.to_string());

        let url = config.resolve_endpoint().unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/ws/events?token=tok123"
        );

        std::env::remove_var(var);
    }

    #[test]
    fn test_resolve_endpoint_without_token() {
        let mut config = ClientConfig::default();
        config.client.token_env = Some("EVENTBUS_CONFIG_TEST_TOKEN_UNSET".to_string());

        let url = config.resolve_endpoint().unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/events");
        assert_eq!(config.token(), None);
    }

    #[test]
    fn test_to_toml_string_round_trips() {
        let mut config = ClientConfig::default();
        config.heartbeat.max_missed_pongs = Some(2);

        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[heartbeat]"));
        assert!(!rendered.contains("token_env"));

        let reparsed = ClientConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }
}
