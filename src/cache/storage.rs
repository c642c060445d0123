//! SQLite implementation of the response cache.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheEntry, CacheStore};
use crate::db::Database;
use crate::net::{Response, ResponseType};

const SCHEMA_VERSION: u32 = 1;

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per named generation; rowid gives creation order
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    redirected INTEGER NOT NULL DEFAULT 0,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);
"#;

/// SQLite-based response cache.
pub struct SqliteCacheStore {
  conn: Mutex<Connection>,
}

impl SqliteCacheStore {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    let db = Database::open(path, CACHE_SCHEMA, SCHEMA_VERSION)?;
    Ok(Self {
      conn: Mutex::new(db.into_connection()),
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let db = Database::open_in_memory(CACHE_SCHEMA, SCHEMA_VERSION)?;
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

fn kind_to_str(kind: ResponseType) -> &'static str {
  match kind {
    ResponseType::Basic => "basic",
    ResponseType::Cors => "cors",
    ResponseType::Opaque => "opaque",
  }
}

fn kind_from_str(s: &str) -> Result<ResponseType> {
  match s {
    "basic" => Ok(ResponseType::Basic),
    "cors" => Ok(ResponseType::Cors),
    "opaque" => Ok(ResponseType::Opaque),
    other => Err(eyre!("Unknown response type in cache: {}", other)),
  }
}

fn ensure_generation(conn: &Connection, generation: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to create generation {}: {}", generation, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, generation: &str, entry: &CacheEntry) -> Result<()> {
  let headers = serde_json::to_string(&entry.response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (generation, request_key, method, url, status, response_type, redirected, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        entry.key,
        entry.method,
        entry.url,
        entry.response.status,
        kind_to_str(entry.response.kind),
        entry.response.redirected,
        headers,
        entry.response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry {}: {}", entry.url, e))?;

  Ok(())
}

impl CacheStore for SqliteCacheStore {
  fn generations(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation: {}", e))?;

    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE generation = ?",
      params![generation],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", generation, e))?;

    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE name = ?",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to delete generation {}: {}", generation, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, response_type, redirected, headers, body FROM cache_entries
         WHERE generation = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, bool, String, Vec<u8>)> = stmt
      .query_row(params![generation, key], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up cache entry: {}", e))?;

    match row {
      Some((status, kind, redirected, headers, body)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(Response {
          status,
          kind: kind_from_str(&kind)?,
          redirected,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self.lock()?;
    ensure_generation(&conn, generation)?;
    insert_entry(&conn, generation, entry)
  }

  fn put_all(&self, generation: &str, entries: &[CacheEntry]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, generation)?;
    for entry in entries {
      insert_entry(&tx, generation, entry)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self, generation: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT request_key FROM cache_entries WHERE generation = ? ORDER BY request_key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![generation], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache keys: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache key: {}", e))?;

    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(key: &str, body: &str) -> CacheEntry {
    CacheEntry {
      key: key.to_string(),
      method: "GET".to_string(),
      url: format!("http://localhost/{}", key),
      response: Response::new(200, body).with_header("content-type", "text/plain"),
    }
  }

  #[test]
  fn test_put_and_lookup() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.put("v1", &entry("a", "alpha")).unwrap();

    let found = store.lookup("v1", "a").unwrap().unwrap();
    assert_eq!(found, entry("a", "alpha").response);
    assert!(store.lookup("v1", "b").unwrap().is_none());
    assert!(store.lookup("v2", "a").unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_same_key() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.put("v1", &entry("a", "old")).unwrap();
    store.put("v1", &entry("a", "new")).unwrap();

    assert_eq!(store.keys("v1").unwrap(), vec!["a".to_string()]);
    assert_eq!(store.lookup("v1", "a").unwrap().unwrap().body, b"new");
  }

  #[test]
  fn test_generations_in_creation_order() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store.put("v2", &entry("a", "x")).unwrap();
    store.put("v1", &entry("a", "y")).unwrap();
    store.put("v2", &entry("b", "z")).unwrap();

    assert_eq!(store.generations().unwrap(), vec!["v2", "v1"]);
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let store = SqliteCacheStore::open_in_memory().unwrap();
    store
      .put_all("v1", &[entry("a", "1"), entry("b", "2")])
      .unwrap();
    store.put("v2", &entry("a", "3")).unwrap();

    assert!(store.delete_generation("v1").unwrap());
    assert!(!store.delete_generation("v1").unwrap());
    assert!(store.keys("v1").unwrap().is_empty());
    assert_eq!(store.generations().unwrap(), vec!["v2"]);
    assert_eq!(store.lookup("v2", "a").unwrap().unwrap().body, b"3");
  }

  #[test]
  fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = SqliteCacheStore::open(&path).unwrap();
      store.put("v1", &entry("a", "persisted")).unwrap();
    }

    let store = SqliteCacheStore::open(&path).unwrap();
    assert_eq!(
      store.lookup("v1", "a").unwrap().unwrap().body,
      b"persisted"
    );
  }
}
