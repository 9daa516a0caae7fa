//! Connection handles and the sinks behind them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::WriteError;

/// Unique identity of one connection, distinct across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Something that can write a notification to one connected peer.
///
/// `deliver` resolves only once the write has completed (or failed), so
/// callers observe the real outcome of the write.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// Write one notification to the peer.
    async fn deliver(&self, message: &str) -> Result<(), WriteError>;
}

/// Registry-side handle to a live connection.
///
/// Cloning is cheap; every clone shares the same sink and identity.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Arc<dyn NotificationSink>,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    /// Wrap a sink in a handle with a fresh identity.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink,
            connected_at: Utc::now(),
        }
    }

    /// Identity used for compare-and-remove on disconnect.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write a notification through the underlying sink.
    pub async fn deliver(&self, message: &str) -> Result<(), WriteError> {
        self.sink.deliver(message).await
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// A notification handed to a connection's writer task.
///
/// The writer must call [`OutboundNotification::complete`] with the result of
/// the socket write; dropping it unanswered reports the connection as closed.
#[derive(Debug)]
pub struct OutboundNotification {
    /// The notification text
    pub message: String,
    ack: oneshot::Sender<Result<(), WriteError>>,
}

impl OutboundNotification {
    /// Report the outcome of the write back to the dispatcher.
    pub fn complete(self, result: Result<(), WriteError>) {
        // Dispatcher may have timed out and gone away
        let _ = self.ack.send(result);
    }
}

/// Sink that forwards notifications to a writer task over an mpsc channel.
///
/// This keeps socket ownership with the connection task while still letting
/// the dispatcher wait for the write result.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutboundNotification>,
}

impl ChannelSink {
    /// Create a sink and the receiver the writer task should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundNotification>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, message: &str) -> Result<(), WriteError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(OutboundNotification {
                message: message.to_string(),
                ack,
            })
            .await
            .map_err(|_| WriteError::Closed)?;

        done.await.map_err(|_| WriteError::Closed)?
    }
}
