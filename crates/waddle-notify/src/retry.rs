//! Ordered replay of pending notifications.
//!
//! The retry engine takes a snapshot of a client's backlog, replays it
//! oldest-first through the [`Dispatcher`], and prunes whatever was settled:
//!
//! - `Delivered` removes the message.
//! - `NotConnected` stops the pass; this and every later message stay queued.
//! - `WriteFailed` drops the message. A write failure on a live connection is
//!   not the offline condition buffering exists for, so it is reported and
//!   never retried.
//!
//! Replays for one client are serialized with a per-client async lock, so a
//! sweep, a manual retry and the opportunistic retry after a submission never
//! deliver the same backlog concurrently. No store or registry lock is held
//! across a write.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::pending::{PendingMessage, PendingStore};
use crate::types::ClientId;

/// A pending message discarded after a failed write.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedMessage {
    /// The discarded message
    #[serde(flatten)]
    pub message: PendingMessage,
    /// Why the write failed
    pub reason: String,
}

/// Summary of a replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// The client had no backlog
    NothingToDo,
    /// Every message in the snapshot was settled and nothing is left
    Drained,
    /// Messages are still waiting (client offline or new arrivals)
    Pending,
}

/// Outcome of replaying one client's backlog.
#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    /// The client replayed
    pub client_id: ClientId,
    /// Size of the snapshot taken at the start of the pass
    pub backlog: usize,
    /// Messages delivered in this pass
    pub delivered: usize,
    /// Messages dropped after write failures
    pub dropped: Vec<DroppedMessage>,
    /// Messages still waiting after the pass
    pub pending: usize,
}

impl RetryReport {
    fn nothing_to_do(client_id: &ClientId) -> Self {
        Self {
            client_id: client_id.clone(),
            backlog: 0,
            delivered: 0,
            dropped: Vec::new(),
            pending: 0,
        }
    }

    /// Classify the pass.
    pub fn status(&self) -> RetryStatus {
        if self.backlog == 0 && self.pending == 0 {
            RetryStatus::NothingToDo
        } else if self.pending == 0 {
            RetryStatus::Drained
        } else {
            RetryStatus::Pending
        }
    }
}

/// Outcome of replaying every backlog.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// One report per client that had a backlog
    pub clients: Vec<RetryReport>,
    /// Messages still waiting across all clients after the sweep
    pub total_pending: usize,
}

impl SweepReport {
    /// Messages delivered across all clients.
    pub fn delivered(&self) -> usize {
        self.clients.iter().map(|r| r.delivered).sum()
    }

    /// Messages dropped across all clients.
    pub fn dropped(&self) -> usize {
        self.clients.iter().map(|r| r.dropped.len()).sum()
    }

    /// Whether the sweep found nothing to replay.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Replays pending notifications through the dispatcher.
pub struct RetryEngine {
    dispatcher: Arc<Dispatcher>,
    store: Arc<PendingStore>,
    client_locks: DashMap<ClientId, Arc<Mutex<()>>>,
}

impl RetryEngine {
    /// Create a retry engine over a dispatcher and store.
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<PendingStore>) -> Self {
        Self {
            dispatcher,
            store,
            client_locks: DashMap::new(),
        }
    }

    /// Replay one client's backlog in enqueue order.
    ///
    /// A client with no backlog yields a report with
    /// [`RetryStatus::NothingToDo`]; that is not an error.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn retry_client(&self, client_id: &ClientId) -> RetryReport {
        let lock = Arc::clone(&*self.client_locks.entry(client_id.clone()).or_default());
        let report = {
            let _guard = lock.lock().await;
            self.replay(client_id).await
        };
        drop(lock);

        // Only the map holds the lock now unless another replay is queued on it
        self.client_locks
            .remove_if(client_id, |_, lock| Arc::strong_count(lock) == 1);

        report
    }

    /// Replay every client's backlog, one client at a time.
    #[instrument(skip(self))]
    pub async fn retry_all(&self) -> SweepReport {
        let clients = self.store.client_ids();
        if clients.is_empty() {
            debug!("No pending notifications to retry");
            return SweepReport::default();
        }

        let mut reports = Vec::with_capacity(clients.len());
        for client_id in &clients {
            reports.push(self.retry_client(client_id).await);
        }

        let report = SweepReport {
            clients: reports,
            total_pending: self.store.total_pending(),
        };
        info!(
            clients = report.clients.len(),
            delivered = report.delivered(),
            dropped = report.dropped(),
            remaining = report.total_pending,
            "Retry sweep complete"
        );
        report
    }

    async fn replay(&self, client_id: &ClientId) -> RetryReport {
        let backlog = self.store.snapshot(client_id);
        if backlog.is_empty() {
            debug!("Nothing to retry");
            return RetryReport::nothing_to_do(client_id);
        }

        let mut settled = HashSet::new();
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for pending in &backlog {
            match self.dispatcher.dispatch(client_id, &pending.message).await {
                DispatchOutcome::Delivered => {
                    settled.insert(pending.id);
                    delivered += 1;
                }
                DispatchOutcome::NotConnected => {
                    debug!(message_id = pending.id, "Client offline, keeping remaining backlog");
                    break;
                }
                DispatchOutcome::WriteFailed(reason) => {
                    warn!(
                        message_id = pending.id,
                        enqueued_at = %pending.enqueued_at,
                        reason = %reason,
                        "Dropping pending notification after write failure"
                    );
                    settled.insert(pending.id);
                    dropped.push(DroppedMessage {
                        message: pending.clone(),
                        reason,
                    });
                }
            }
        }

        let pending = if settled.is_empty() {
            self.store.pending_count(client_id)
        } else {
            self.store.drain_delivered(client_id, &settled)
        };

        debug!(
            backlog = backlog.len(),
            delivered,
            dropped = dropped.len(),
            pending,
            "Client retry complete"
        );

        RetryReport {
            client_id: client_id.clone(),
            backlog: backlog.len(),
            delivered,
            dropped,
            pending,
        }
    }
}

impl fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryEngine")
            .field("active_clients", &self.client_locks.len())
            .finish()
    }
}
