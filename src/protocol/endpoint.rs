//! Endpoint parsing and credential redaction for the event bus URL
//!
//! The bus lives at a single well-known WebSocket URI. Session credentials are
//! established out-of-band; when a token is configured it travels as the
//! `token` query parameter and must never show up in logs.

use thiserror::Error;
use url::Url;

/// Default event bus endpoint of a locally running backend
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/events";

const TOKEN_PARAM: &str = "token";
const REDACTED: &str = "***";

/// Parse and validate an event bus endpoint (`ws://` or `wss://` only)
pub fn parse_endpoint(endpoint: &str) -> Result<Url, EndpointError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| EndpointError::Malformed(format!("{endpoint}: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(EndpointError::MissingHost(endpoint.to_string()));
    }

    Ok(url)
}

/// Return a copy of `url` carrying `token` as its `token` query parameter.
///
/// An existing token parameter is replaced; other query parameters are kept.
pub fn with_token(url: &Url, token: &str) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TOKEN_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut result = url.clone();
    result.set_query(None);
    {
        let mut pairs = result.query_pairs_mut();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(TOKEN_PARAM, token);
    }
    result
}

/// Render `url` for logs with the token and any userinfo password masked
pub fn redact_endpoint(url: &Url) -> String {
    let mut redacted = url.clone();
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some(REDACTED));
    }

    if redacted.query().is_some() {
        let pairs: Vec<(String, String)> = redacted
            .query_pairs()
            .map(|(key, value)| {
                if key == TOKEN_PARAM {
                    (key.into_owned(), REDACTED.to_string())
                } else {
                    (key.into_owned(), value.into_owned())
                }
            })
            .collect();
        redacted.set_query(None);
        if !pairs.is_empty() {
            let mut serializer = redacted.query_pairs_mut();
            for (key, value) in &pairs {
                serializer.append_pair(key, value);
            }
        }
    }

    redacted.to_string()
}

/// Endpoint validation errors
#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    #[error("Malformed endpoint URL: {0}")]
    Malformed(String),
    #[error("Unsupported endpoint scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("Endpoint has no host: {0}")]
    MissingHost(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_endpoint_is_valid() {
        let url = parse_endpoint(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(8000));
        assert_eq!(url.path(), "/ws/events");
    }

    #[test]
    fn test_rejects_non_websocket_schemes() {
        assert_eq!(
            parse_endpoint("http://localhost:8000/ws/events"),
            Err(EndpointError::UnsupportedScheme("http".to_string()))
        );
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(EndpointError::Malformed(_))
        ));
        assert!(parse_endpoint("wss://bus.example.com/ws/events").is_ok());
    }

    #[test]
    fn test_with_token_appends_and_replaces() {
        let url = parse_endpoint("ws://localhost:8000/ws/events?client=ui").unwrap();

        let tokenized = with_token(&url, "abc");
        assert_eq!(
            tokenized.as_str(),
            "ws://localhost:8000/ws/events?client=ui&token=abc"
        );

        let replaced = with_token(&tokenized, "def");
        assert_eq!(
            replaced.as_str(),
            "ws://localhost:8000/ws/events?client=ui&token=def"
        );
    }

    #[test]
    fn test_redact_endpoint_masks_token() {
        let url = with_token(&parse_endpoint(DEFAULT_ENDPOINT).unwrap(), "s3cr3t");
        let shown = redact_endpoint(&url);
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains("token=***"));

        let plain = parse_endpoint(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(redact_endpoint(&plain), DEFAULT_ENDPOINT);
    }

    proptest! {
        #[test]
        fn redacted_endpoint_never_leaks_token(token in "[a-zA-Z0-9]{8,32}") {
            let url = with_token(&parse_endpoint(DEFAULT_ENDPOINT).unwrap(), &token);
            let shown = redact_endpoint(&url);
            prop_assert!(!shown.contains(&token), "token leaked: {}", shown);
        }

        #[test]
        fn with_token_is_idempotent(token in "[a-zA-Z0-9]{1,16}") {
            let url = parse_endpoint(DEFAULT_ENDPOINT).unwrap();
            let once = with_token(&url, &token);
            let twice = with_token(&once, &token);
            prop_assert_eq!(once, twice);
        }
    }
}
