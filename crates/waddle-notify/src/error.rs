//! Error types for the notification core.

use std::time::Duration;

use thiserror::Error;

/// Errors returned to callers of the notification service.
///
/// Delivery outcomes (offline client, failed write) are not errors; they are
/// reported through [`crate::DispatchOutcome`] and [`crate::SubmitOutcome`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// A required field was missing or blank
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Client identifier failed validation
    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    /// Message body exceeds the configured limit
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the rejected message in bytes
        size: usize,
        /// Configured maximum in bytes
        max: usize,
    },
}

impl NotifyError {
    /// Create a new invalid client id error.
    pub fn invalid_client_id(msg: impl Into<String>) -> Self {
        Self::InvalidClientId(msg.into())
    }

    /// Whether this error stems from caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_) | Self::InvalidClientId(_) | Self::MessageTooLarge { .. }
        )
    }
}

/// Failure to write a notification to a live connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The connection's writer has gone away
    #[error("connection closed")]
    Closed,

    /// The write did not complete within the configured timeout
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// The transport rejected the write
    #[error("transport error: {0}")]
    Transport(String),
}

impl WriteError {
    /// Create a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
