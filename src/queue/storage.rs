//! SQLite implementation of the pending message store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{QueueStore, QueuedMessage};
use crate::db::Database;

/// Schema for the message store.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed outbound message store.
pub struct SqliteQueueStore {
  conn: Mutex<Connection>,
}

impl SqliteQueueStore {
  /// Open (or create) the store at `path`, stamped with `version`.
  pub fn open(path: &Path, version: u32) -> Result<Self> {
    let db = Database::open(path, QUEUE_SCHEMA, version)?;
    Ok(Self {
      conn: Mutex::new(db.into_connection()),
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let db = Database::open_in_memory(QUEUE_SCHEMA, 1)?;
    Ok(Self {
      conn: Mutex::new(db.into_connection()),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl QueueStore for SqliteQueueStore {
  fn append(&self, payload: &Value) -> Result<i64> {
    let conn = self.lock()?;
    let data =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize message: {}", e))?;

    conn
      .execute(
        "INSERT INTO messages (payload, queued_at) VALUES (?, datetime('now'))",
        params![data],
      )
      .map_err(|e| eyre!("Failed to queue message: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn read_all(&self) -> Result<Vec<QueuedMessage>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM messages ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read queued messages: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read queued message: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, queued_at)| {
        Ok(QueuedMessage {
          id,
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Failed to deserialize message {}: {}", id, e))?,
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect()
  }

  fn clear_through(&self, last_id: i64) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM messages WHERE id <= ?", params![last_id])
      .map_err(|e| eyre!("Failed to clear queued messages: {}", e))?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
