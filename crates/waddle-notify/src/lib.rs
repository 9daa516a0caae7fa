//! # waddle-notify
//!
//! Notification delivery core for Waddle Social.
//!
//! Senders submit short text notifications addressed to a client identifier.
//! If the client holds a live connection the notification is written to it
//! immediately; otherwise it is buffered and replayed once the client is
//! reachable again.
//!
//! ## Architecture
//!
//! ```text
//!  submit ──► NotificationService ──► Dispatcher ──► ConnectionRegistry ──► NotificationSink
//!                   │    ▲                 ▲
//!          (offline)│    │(replay)         │
//!                   ▼    │                 │
//!              PendingStore ◄──── RetryEngine ◄──── Sweeper (periodic)
//! ```
//!
//! - **Registry**: at most one live connection per client id
//! - **Dispatcher**: one bounded write, classified as delivered / not connected / failed
//! - **Pending store**: per-client FIFO of undeliverable notifications
//! - **Retry engine**: ordered replay of a client's backlog
//! - **Sweeper**: non-overlapping periodic replay of every backlog

pub mod clock;
pub mod dispatch;
pub mod pending;
pub mod registry;
pub mod retry;
pub mod service;
pub mod sweeper;

mod error;
mod types;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{NotifyError, WriteError};
pub use pending::{EnqueueReceipt, PendingMessage, PendingStore};
pub use registry::{
    ChannelSink, ConnectionHandle, ConnectionId, ConnectionRegistry, NotificationSink,
    OutboundNotification,
};
pub use retry::{DroppedMessage, RetryEngine, RetryReport, RetryStatus, SweepReport};
pub use service::{NotificationService, ServiceStatus, SubmitOutcome};
pub use sweeper::{Sweeper, SweeperHandle};
pub use types::{ClientId, NotifyConfig, MAX_CLIENT_ID_BYTES};
