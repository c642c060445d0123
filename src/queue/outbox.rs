//! Store-and-replay policy for outbound chat messages.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::traits::{MessageSender, QueueStore, QueuedMessage};

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
  /// Messages in the queue when the flush started
  pub queued: usize,
  /// Messages the endpoint accepted during this flush
  pub delivered: usize,
  /// Whether the store was cleared
  pub cleared: bool,
}

impl FlushReport {
  pub fn is_complete(&self) -> bool {
    self.delivered == self.queued
  }
}

/// Durable outbound queue with all-or-nothing replay.
///
/// A flush either delivers every queued message and clears the store, or
/// stops at the first failure and leaves the whole queue in place. Messages
/// delivered before the failure are sent again on the next flush.
pub struct MessageQueue<S: MessageSender> {
  store: Arc<dyn QueueStore>,
  sender: Arc<S>,
}

impl<S: MessageSender> MessageQueue<S> {
  pub fn new(store: Arc<dyn QueueStore>, sender: Arc<S>) -> Self {
    Self { store, sender }
  }

  /// Append a message to the tail of the queue.
  pub fn enqueue(&self, payload: &Value) -> Result<i64> {
    let id = self.store.append(payload)?;
    info!(id, "Queued message for background sync");
    Ok(id)
  }

  /// Pending messages, oldest first. A failed read counts as an empty queue.
  pub fn pending(&self) -> Vec<QueuedMessage> {
    match self.store.read_all() {
      Ok(messages) => messages,
      Err(e) => {
        warn!(error = %e, "Failed to read queued messages");
        Vec::new()
      }
    }
  }

  /// Replay every queued message in order. Never fails; problems are logged.
  ///
  /// Only the batch read at the start is cleared. Messages enqueued while
  /// the flush is sending wait for the next one.
  pub async fn flush(&self) -> FlushReport {
    let messages = match self.store.read_all() {
      Ok(messages) => messages,
      Err(e) => {
        warn!(error = %e, "Failed to read queued messages");
        return FlushReport::default();
      }
    };
    let mut report = FlushReport {
      queued: messages.len(),
      ..FlushReport::default()
    };

    for message in &messages {
      if let Err(e) = self.sender.send(&message.payload).await {
        error!(
          id = message.id,
          delivered = report.delivered,
          queued = report.queued,
          error = %e,
          "Error syncing messages"
        );
        return report;
      }
      report.delivered += 1;
    }

    let Some(last) = messages.last() else {
      report.cleared = true;
      return report;
    };

    match self.store.clear_through(last.id) {
      Ok(()) => report.cleared = true,
      Err(e) => warn!(error = %e, "Failed to clear queued messages"),
    }

    info!(delivered = report.delivered, "Synced queued messages");

    report
  }
}
