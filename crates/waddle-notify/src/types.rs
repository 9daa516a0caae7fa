//! Shared types for the notification core.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::NotifyError;

/// Maximum length of a client identifier in bytes.
pub const MAX_CLIENT_ID_BYTES: usize = 256;

/// Caller-chosen identifier naming one logical recipient.
///
/// The identifier is opaque; the only constraints are that it is non-blank
/// and at most [`MAX_CLIENT_ID_BYTES`] long. Use [`ClientId::parse`] on
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Validate and wrap a client identifier.
    ///
    /// Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, NotifyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NotifyError::MissingField("client_id"));
        }
        if trimmed.len() > MAX_CLIENT_ID_BYTES {
            return Err(NotifyError::invalid_client_id(format!(
                "exceeds {} bytes",
                MAX_CLIENT_ID_BYTES
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(NotifyError::invalid_client_id(
                "contains control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Tunables for the notification core.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Upper bound on a single write to a connection
    pub write_timeout: Duration,
    /// Period between background retry sweeps
    pub retry_interval: Duration,
    /// Per-client backlog cap; the oldest entry is evicted when full
    pub max_pending_per_client: Option<usize>,
    /// Largest accepted message body in bytes
    pub max_message_bytes: usize,
    /// Replay a client's backlog as soon as it connects
    pub retry_on_connect: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(30),
            max_pending_per_client: None,
            max_message_bytes: 64 * 1024,
            retry_on_connect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_parse_trims() {
        let id = ClientId::parse("  client1 ").unwrap();
        assert_eq!(id.as_str(), "client1");
    }

    #[test]
    fn test_client_id_parse_rejects_blank() {
        assert_eq!(
            ClientId::parse("   "),
            Err(NotifyError::MissingField("client_id"))
        );
        assert_eq!(ClientId::parse(""), Err(NotifyError::MissingField("client_id")));
    }

    #[test]
    fn test_client_id_parse_rejects_oversized() {
        let raw = "x".repeat(MAX_CLIENT_ID_BYTES + 1);
        assert!(matches!(
            ClientId::parse(&raw),
            Err(NotifyError::InvalidClientId(_))
        ));

        let raw = "x".repeat(MAX_CLIENT_ID_BYTES);
        assert!(ClientId::parse(&raw).is_ok());
    }

    #[test]
    fn test_client_id_parse_rejects_control_chars() {
        assert!(matches!(
            ClientId::parse("client\u{0}1"),
            Err(NotifyError::InvalidClientId(_))
        ));
    }

    #[test]
    fn test_client_id_serializes_as_string() {
        let id = ClientId::parse("client1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"client1\"");
    }

    #[test]
    fn test_config_defaults() {
        let config = NotifyConfig::default();
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert!(config.max_pending_per_client.is_none());
        assert!(config.retry_on_connect);
    }
}
