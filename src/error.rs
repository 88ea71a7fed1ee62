//! Error types for the event bus client
//!
//! Transport and decode failures never reach subscribers; they surface as
//! `last_error` on the connection and in logs. Everything recorded there goes
//! through [`sanitize_error_message`] first so credentials never leak.

use crate::config::ConfigError;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for event bus client operations
///
/// Construction fails with `Config`; `EventClient::try_send` fails with
/// `Serialization` or `Transport`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

const MAX_ERROR_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*[^\s&]+").expect("valid secret regex")
});

static SECRET_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path regex")
});

/// Sanitize an error message before it is stored or logged.
///
/// Masks `token=`, `password=`, `key=` and `secret=` values, redacts paths into
/// credential directories and caps the result at 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();
    sanitized = SECRET_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], TRUNCATE_SUFFIX);
    }

    sanitized
}
