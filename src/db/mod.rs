use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// SQLite connection wrapper shared by the cache and queue stores
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at `path`, running `schema` and stamping `version`.
  pub fn open(path: &Path, schema: &str, version: u32) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self { conn };
    db.run_migrations(schema, version)?;

    Ok(db)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory(schema: &str, version: u32) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self { conn };
    db.run_migrations(schema, version)?;

    Ok(db)
  }

  fn run_migrations(&self, schema: &str, version: u32) -> Result<()> {
    let current: u32 = self
      .conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    if current > version {
      return Err(eyre!(
        "Database schema version {} is newer than supported version {}",
        current,
        version
      ));
    }

    self
      .conn
      .execute_batch(schema)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

    self
      .conn
      .pragma_update(None, "user_version", version)
      .map_err(|e| eyre!("Failed to record schema version: {}", e))?;

    Ok(())
  }

  pub fn into_connection(self) -> Connection {
    self.conn
  }
}

/// Default directory for the agent's databases.
pub fn default_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("drawchat"))
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY);";

  #[test]
  fn test_open_stamps_version() {
    let conn = Database::open_in_memory(SCHEMA, 3)
      .unwrap()
      .into_connection();
    let version: u32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .unwrap();
    assert_eq!(version, 3);
  }

  #[test]
  fn test_newer_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    drop(Database::open(&path, SCHEMA, 2).unwrap());
    assert!(Database::open(&path, SCHEMA, 2).is_ok());
    assert!(Database::open(&path, SCHEMA, 1).is_err());
  }
}
