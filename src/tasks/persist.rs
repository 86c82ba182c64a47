//! Key-value persistence for task snapshots.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use crate::db::schema::KV_SCHEMA;
use crate::db::Database;

/// Minimal string key-value store the task snapshot is written to.
pub trait KeyValueStore {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
  fn get(&self, key: &str) -> Result<Option<String>> {
    (**self).get(key)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    (**self).set(key, value)
  }
}

/// SQLite-backed key-value store.
pub struct SqliteKv {
  db: Database,
}

impl SqliteKv {
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, KV_SCHEMA)?,
    })
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      db: Database::open_in_memory(KV_SCHEMA)?,
    })
  }
}

impl KeyValueStore for SqliteKv {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.db.lock()?;
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read '{}': {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write '{}': {}", key, e))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_key() {
    let kv = SqliteKv::open_in_memory().unwrap();
    assert_eq!(kv.get("tasks").unwrap(), None);
  }

  #[test]
  fn test_set_overwrites() {
    let kv = SqliteKv::open_in_memory().unwrap();
    kv.set("tasks", "[]").unwrap();
    kv.set("tasks", "[1]").unwrap();
    assert_eq!(kv.get("tasks").unwrap().as_deref(), Some("[1]"));
  }

  #[test]
  fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tasks.db");

    SqliteKv::open(&path).unwrap().set("tasks", "[]").unwrap();
    let kv = SqliteKv::open(&path).unwrap();
    assert_eq!(kv.get("tasks").unwrap().as_deref(), Some("[]"));
  }
}
