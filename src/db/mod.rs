pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite connection wrapper shared by the task snapshot store and the cache buckets
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`, applying `schema`
  pub fn open(path: &Path, schema: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations(schema)?;

    Ok(db)
  }

  /// Open a private in-memory database
  #[cfg(test)]
  pub fn open_in_memory(schema: &str) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations(schema)?;

    Ok(db)
  }

  /// Get the default data directory
  pub fn default_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tasklet"))
  }

  /// Run database migrations
  fn run_migrations(&self, schema: &str) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  /// Lock the connection for a unit of work
  pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}
