//! Outbound message queue for chat messages sent while offline.
//!
//! - `QueueStore`: append / read-all / clear record store, backed by SQLite
//! - `MessageSender`: one-message delivery, with an HTTP implementation
//! - `MessageQueue`: enqueue and all-or-nothing flush

mod outbox;
mod sender;
mod storage;
mod traits;

pub use outbox::{FlushReport, MessageQueue};
pub use sender::HttpSender;
pub use storage::SqliteQueueStore;
pub use traits::{MessageSender, QueueStore, QueuedMessage};
