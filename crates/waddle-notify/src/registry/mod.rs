//! Connection Registry for live notification delivery.
//!
//! This module tracks the one live connection each client currently holds,
//! keyed by client id, so notifications can be written to it directly.
//!
//! ## Architecture
//!
//! Each connection registers a [`ConnectionHandle`] when it is established.
//! The handle wraps a [`NotificationSink`], which performs the actual write,
//! plus a unique [`ConnectionId`] used to make removal identity-checked.
//!
//! ```text
//! WebSocket session (client1) ─► ChannelSink ─┐
//!                                             ├─► DashMap<ClientId, ConnectionHandle>
//! WebSocket session (client2) ─► ChannelSink ─┘
//! ```

mod connection;
mod connection_registry;

pub use connection::{
    ChannelSink, ConnectionHandle, ConnectionId, NotificationSink, OutboundNotification,
};
pub use connection_registry::ConnectionRegistry;
