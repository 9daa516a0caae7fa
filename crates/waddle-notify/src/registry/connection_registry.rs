//! Connection Registry implementation.
//!
//! Tracks the live connection of each client by client id.

use std::fmt;

use dashmap::DashMap;
use tracing::{debug, info, instrument};

use super::connection::{ConnectionHandle, ConnectionId};
use crate::types::ClientId;

/// Registry for tracking live client connections.
///
/// Thread-safe registry mapping client ids to connection handles. Uses
/// DashMap so each operation runs under one short shard lock; no I/O ever
/// happens while a shard is held.
///
/// ## Usage
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
///
/// // When a connection is established:
/// let (sink, rx) = ChannelSink::channel(32);
/// let handle = ConnectionHandle::new(Arc::new(sink));
/// let connection_id = handle.id();
/// registry.register(client_id.clone(), handle);
///
/// // When delivering:
/// if let Some(handle) = registry.lookup(&client_id) {
///     handle.deliver("hello").await?;
/// }
///
/// // When the connection closes:
/// registry.unregister(&client_id, connection_id);
/// ```
pub struct ConnectionRegistry {
    /// Map of client id to its current connection
    connections: DashMap<ClientId, ConnectionHandle>,
}

impl ConnectionRegistry {
    /// Create a new connection registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection for a client.
    ///
    /// If the client already has a registered connection it is replaced. The
    /// superseded handle is not closed here; its session cleans up through its
    /// own disconnect path. Returns the id of the replaced connection, if any.
    #[instrument(skip(self, handle), fields(client_id = %client_id, connection_id = %handle.id()))]
    pub fn register(&self, client_id: ClientId, handle: ConnectionHandle) -> Option<ConnectionId> {
        let existing = self.connections.insert(client_id, handle);
        match &existing {
            Some(previous) => {
                debug!(previous = %previous.id(), "Replaced existing connection registration")
            }
            None => debug!("Registered new connection"),
        }
        existing.map(|previous| previous.id())
    }

    /// Unregister a connection.
    ///
    /// Only removes the entry if it still belongs to `connection_id`, so a
    /// late disconnect from a superseded connection never evicts the newer
    /// one. Returns true if an entry was removed.
    #[instrument(skip(self), fields(client_id = %client_id, connection_id = %connection_id))]
    pub fn unregister(&self, client_id: &ClientId, connection_id: ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(client_id, |_, handle| handle.id() == connection_id);
        if removed.is_some() {
            debug!("Unregistered connection");
            true
        } else {
            debug!("Connection was not registered or was superseded");
            false
        }
    }

    /// Look up the live connection for a client.
    ///
    /// The returned handle is a clone, so the shard lock is released before
    /// the caller writes to it.
    pub fn lookup(&self, client_id: &ClientId) -> Option<ConnectionHandle> {
        self.connections
            .get(client_id)
            .map(|entry| entry.value().clone())
    }

    /// Check if a client is currently connected.
    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.connections.contains_key(client_id)
    }

    /// Get the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// List all connected client ids.
    ///
    /// Useful for debugging and monitoring.
    pub fn list_clients(&self) -> Vec<ClientId> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}
