//! Notification service: the entry point senders and transports talk to.
//!
//! Wires the registry, dispatcher, pending store and retry engine together
//! and exposes the operation set used by the HTTP API and the WebSocket
//! sessions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::NotifyError;
use crate::pending::{PendingMessage, PendingStore};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::retry::{RetryEngine, RetryReport, SweepReport};
use crate::types::{ClientId, NotifyConfig};

/// Disposition of a submitted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Written to the client's live connection
    Delivered {
        /// Backlog left after the opportunistic replay
        pending: usize,
    },
    /// Client offline; buffered for retry
    Queued {
        /// Backlog including this notification
        pending: usize,
        /// Id of the oldest notification dropped to make room, if the
        /// client's backlog was at its cap
        #[serde(skip_serializing_if = "Option::is_none")]
        evicted: Option<u64>,
    },
    /// Client connected but the write failed; not stored
    Failed {
        /// Why the write failed
        reason: String,
    },
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Live connections
    pub connections: usize,
    /// Clients with a backlog
    pub pending_clients: usize,
    /// Messages waiting across all clients
    pub total_pending: usize,
}

/// Notification delivery service.
#[derive(Debug)]
pub struct NotificationService {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<PendingStore>,
    retry: Arc<RetryEngine>,
    config: NotifyConfig,
}

impl NotificationService {
    /// Create a service using the system clock.
    pub fn new(config: NotifyConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a service with an injected clock for enqueue timestamps.
    pub fn with_clock(config: NotifyConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config.write_timeout,
        ));
        let store = Arc::new(PendingStore::new(config.max_pending_per_client, clock));
        let retry = Arc::new(RetryEngine::new(
            Arc::clone(&dispatcher),
            Arc::clone(&store),
        ));

        Self {
            registry,
            dispatcher,
            store,
            retry,
            config,
        }
    }

    /// The service configuration.
    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// The live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The retry engine, for wiring up a [`crate::Sweeper`].
    pub fn retry_engine(&self) -> &Arc<RetryEngine> {
        &self.retry
    }

    // === Connection lifecycle ===

    /// Register a newly established connection.
    ///
    /// Any previous connection for the client is superseded. If the client
    /// has a backlog and `retry_on_connect` is enabled, a replay is spawned
    /// and its handle returned.
    #[instrument(skip(self, handle), fields(client_id = %client_id, connection_id = %handle.id()))]
    pub fn connect(
        &self,
        client_id: ClientId,
        handle: ConnectionHandle,
    ) -> Option<JoinHandle<RetryReport>> {
        if self.registry.register(client_id.clone(), handle).is_some() {
            info!("Client reconnected, previous connection superseded");
        } else {
            info!("Client connected");
        }

        let backlog = self.store.pending_count(&client_id);
        if !self.config.retry_on_connect || backlog == 0 {
            return None;
        }

        debug!(backlog, "Replaying backlog for reconnected client");
        let retry = Arc::clone(&self.retry);
        Some(tokio::spawn(async move {
            retry.retry_client(&client_id).await
        }))
    }

    /// Handle a closed connection.
    ///
    /// Identity-checked: a disconnect for a connection that has already been
    /// superseded leaves the newer registration alone.
    #[instrument(skip(self), fields(client_id = %client_id, connection_id = %connection_id))]
    pub fn disconnect(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let removed = self.registry.unregister(client_id, connection_id);
        if removed {
            info!("Client disconnected");
        }
        removed
    }

    // === Submission ===

    /// Submit a notification for delivery.
    ///
    /// Returns a validation error for blank or oversized input; otherwise
    /// always returns a definite disposition.
    #[instrument(skip(self, client_id, message))]
    pub async fn submit(&self, client_id: &str, message: &str) -> Result<SubmitOutcome, NotifyError> {
        let client_id = ClientId::parse(client_id)?;
        self.validate_message(message)?;

        let outcome = match self.dispatcher.dispatch(&client_id, message).await {
            DispatchOutcome::Delivered => {
                let report = self.retry.retry_client(&client_id).await;
                SubmitOutcome::Delivered {
                    pending: report.pending,
                }
            }
            DispatchOutcome::NotConnected => {
                let receipt = self.store.enqueue(&client_id, message);
                SubmitOutcome::Queued {
                    pending: receipt.pending,
                    evicted: receipt.evicted.map(|m| m.id),
                }
            }
            DispatchOutcome::WriteFailed(reason) => {
                warn!(client_id = %client_id, reason = %reason, "Notification delivery failed");
                SubmitOutcome::Failed { reason }
            }
        };

        debug!(client_id = %client_id, outcome = ?outcome, "Notification submitted");
        Ok(outcome)
    }

    fn validate_message(&self, message: &str) -> Result<(), NotifyError> {
        if message.trim().is_empty() {
            return Err(NotifyError::MissingField("message"));
        }
        if message.len() > self.config.max_message_bytes {
            return Err(NotifyError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_bytes,
            });
        }
        Ok(())
    }

    // === Inspection ===

    /// Pending messages for one client, oldest first.
    pub fn pending_for(&self, client_id: &ClientId) -> Vec<PendingMessage> {
        self.store.snapshot(client_id)
    }

    /// Pending messages for every client with a backlog.
    pub fn pending_all(&self) -> BTreeMap<ClientId, Vec<PendingMessage>> {
        self.store.snapshot_all()
    }

    /// Messages waiting across all clients.
    pub fn total_pending(&self) -> usize {
        self.store.total_pending()
    }

    /// Current connection and backlog counters.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            connections: self.registry.connection_count(),
            pending_clients: self.store.client_ids().len(),
            total_pending: self.store.total_pending(),
        }
    }

    // === Manual retry ===

    /// Replay one client's backlog now.
    pub async fn retry_client(&self, client_id: &ClientId) -> RetryReport {
        self.retry.retry_client(client_id).await
    }

    /// Replay every backlog now.
    pub async fn retry_all(&self) -> SweepReport {
        self.retry.retry_all().await
    }
}
