//! Core traits and types for the outbound message queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde_json::Value;

/// A chat message waiting to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
  /// Insertion position; ascending ids are replay order
  pub id: i64,
  /// Message body, opaque to the queue
  pub payload: Value,
  pub queued_at: DateTime<Utc>,
}

/// Durable store of pending messages.
///
/// Records can only be appended, read all at once, or cleared as a batch.
pub trait QueueStore: Send + Sync {
  /// Append a message to the tail. Returns its id.
  fn append(&self, payload: &Value) -> Result<i64>;

  /// Every queued message, oldest first.
  fn read_all(&self) -> Result<Vec<QueuedMessage>>;

  /// Remove every message with an id up to and including `last_id`.
  /// Messages appended after the batch was read are kept.
  fn clear_through(&self, last_id: i64) -> Result<()>;
}

/// Delivers one message to the remote endpoint.
#[async_trait]
pub trait MessageSender: Send + Sync {
  /// `Ok` only when the endpoint accepted the message. Any decoded response
  /// body is returned but carries no meaning for the queue.
  async fn send(&self, payload: &Value) -> Result<Option<Value>>;
}
