//! Pending store for notifications that could not be delivered.
//!
//! Each client with a backlog owns one FIFO [`PendingQueue`]. Entries are
//! identified by a process-local sequence number assigned at enqueue time,
//! so pruning after a replay removes exactly the entries that were settled,
//! even when two entries carry identical text and timestamps.
//!
//! A client whose queue drains to empty has no entry in the store.

mod queue;
mod store;

pub use queue::{PendingMessage, PendingQueue};
pub use store::{EnqueueReceipt, PendingStore};
