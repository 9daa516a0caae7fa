//! Single-attempt notification dispatch.
//!
//! The dispatcher looks up a client's live connection and performs one
//! bounded write. It never buffers and never retries; callers decide what to
//! do with the outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::WriteError;
use crate::registry::ConnectionRegistry;
use crate::types::ClientId;

/// Result of attempting to deliver a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The write completed on the client's live connection
    Delivered,
    /// The client has no live connection
    NotConnected,
    /// The client is connected but the write failed or timed out
    WriteFailed(String),
}

impl DispatchOutcome {
    /// Whether the notification reached the client.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Delivers notifications to live connections.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over a registry with a per-write timeout.
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Attempt one delivery of `message` to `client_id`.
    ///
    /// The registry lock is only held for the lookup; the write runs on a
    /// cloned handle. A failed write does not unregister the connection,
    /// that is left to the transport's disconnect path.
    #[instrument(skip(self, message), fields(client_id = %client_id, len = message.len()))]
    pub async fn dispatch(&self, client_id: &ClientId, message: &str) -> DispatchOutcome {
        let Some(handle) = self.registry.lookup(client_id) else {
            debug!("Recipient not connected");
            return DispatchOutcome::NotConnected;
        };

        match tokio::time::timeout(self.write_timeout, handle.deliver(message)).await {
            Ok(Ok(())) => {
                debug!(connection_id = %handle.id(), "Notification delivered");
                DispatchOutcome::Delivered
            }
            Ok(Err(e)) => {
                warn!(connection_id = %handle.id(), error = %e, "Notification write failed");
                DispatchOutcome::WriteFailed(e.to_string())
            }
            Err(_) => {
                let e = WriteError::Timeout(self.write_timeout);
                warn!(connection_id = %handle.id(), error = %e, "Notification write timed out");
                DispatchOutcome::WriteFailed(e.to_string())
            }
        }
    }
}
