//! Per-client FIFO of pending notifications.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ClientId;

/// A notification waiting for its client to become reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMessage {
    /// Sequence number, unique within the process
    pub id: u64,
    /// Recipient
    pub client_id: ClientId,
    /// Notification text
    pub message: String,
    /// When the notification was buffered
    pub enqueued_at: DateTime<Utc>,
}

/// Queue of pending notifications for one client.
///
/// Maintains messages in FIFO order. An optional maximum size bounds memory;
/// at capacity the oldest message is evicted to make room.
#[derive(Debug)]
pub struct PendingQueue {
    /// The queued messages, oldest first
    messages: VecDeque<PendingMessage>,
    /// Maximum number of messages to hold
    max_size: Option<usize>,
}

impl PendingQueue {
    /// Create an empty queue with an optional size cap.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            max_size,
        }
    }

    /// Append a message.
    ///
    /// Returns the message evicted to make room, if the queue was full.
    pub fn push(&mut self, message: PendingMessage) -> Option<PendingMessage> {
        let evicted = match self.max_size {
            Some(max) if self.messages.len() >= max => self.messages.pop_front(),
            _ => None,
        };
        self.messages.push_back(message);
        evicted
    }

    /// Remove every message whose id is in `ids`, keeping the rest in order.
    ///
    /// Returns the number of messages removed.
    pub fn remove_ids(&mut self, ids: &HashSet<u64>) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !ids.contains(&m.id));
        before - self.messages.len()
    }

    /// Copy of the queued messages, oldest first.
    pub fn to_vec(&self) -> Vec<PendingMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Get the number of messages in the queue.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
