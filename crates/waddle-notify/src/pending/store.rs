//! Process-wide store of per-client pending queues.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use super::queue::{PendingMessage, PendingQueue};
use crate::clock::Clock;
use crate::types::ClientId;

/// Result of buffering a notification.
#[derive(Debug, Clone)]
pub struct EnqueueReceipt {
    /// The buffered message
    pub message: PendingMessage,
    /// The client's backlog size after the append
    pub pending: usize,
    /// Oldest message dropped to stay within the per-client cap
    pub evicted: Option<PendingMessage>,
}

/// Store of undeliverable notifications, one FIFO per client.
///
/// Backed by a DashMap so unrelated clients do not contend on one lock;
/// operations on the same client are mutually exclusive. No I/O happens
/// while a queue is locked.
pub struct PendingStore {
    queues: DashMap<ClientId, PendingQueue>,
    next_id: AtomicU64,
    max_per_client: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl PendingStore {
    /// Create an empty store.
    pub fn new(max_per_client: Option<usize>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_per_client,
            clock,
        }
    }

    /// Append a notification to a client's backlog, creating it if needed.
    #[instrument(skip(self, message), fields(client_id = %client_id))]
    pub fn enqueue(&self, client_id: &ClientId, message: impl Into<String>) -> EnqueueReceipt {
        let pending = PendingMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            client_id: client_id.clone(),
            message: message.into(),
            enqueued_at: self.clock.now(),
        };

        let (evicted, count) = {
            let mut queue = self
                .queues
                .entry(client_id.clone())
                .or_insert_with(|| PendingQueue::new(self.max_per_client));
            let evicted = queue.push(pending.clone());
            (evicted, queue.len())
        };

        if let Some(evicted) = &evicted {
            warn!(
                evicted_id = evicted.id,
                enqueued_at = %evicted.enqueued_at,
                "Pending queue full, evicted oldest notification"
            );
        }
        debug!(message_id = pending.id, pending = count, "Notification stored for retry");

        EnqueueReceipt {
            message: pending,
            pending: count,
            evicted,
        }
    }

    /// Ordered copy of a client's backlog.
    pub fn snapshot(&self, client_id: &ClientId) -> Vec<PendingMessage> {
        self.queues
            .get(client_id)
            .map(|queue| queue.to_vec())
            .unwrap_or_default()
    }

    /// Remove settled messages from a client's backlog.
    ///
    /// Messages are matched by id; the rest keep their order. The client's
    /// entry is deleted when nothing remains. Returns the remaining count.
    #[instrument(skip(self, settled), fields(client_id = %client_id, settled = settled.len()))]
    pub fn drain_delivered(&self, client_id: &ClientId, settled: &HashSet<u64>) -> usize {
        // Prune and delete under one shard lock so an empty queue is never
        // observable
        self.queues.remove_if_mut(client_id, |_, queue| {
            queue.remove_ids(settled);
            queue.is_empty()
        });

        self.pending_count(client_id)
    }

    /// Client ids that currently have a backlog, sorted.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.queues.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of messages waiting for a client.
    pub fn pending_count(&self, client_id: &ClientId) -> usize {
        self.queues.get(client_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of messages waiting across all clients.
    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|r| r.value().len()).sum()
    }

    /// Ordered copy of every client's backlog.
    pub fn snapshot_all(&self) -> BTreeMap<ClientId, Vec<PendingMessage>> {
        self.queues
            .iter()
            .map(|r| (r.key().clone(), r.value().to_vec()))
            .collect()
    }

    /// Whether no client has a backlog.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl fmt::Debug for PendingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStore")
            .field("clients", &self.queues.len())
            .field("max_per_client", &self.max_per_client)
            .finish()
    }
}
