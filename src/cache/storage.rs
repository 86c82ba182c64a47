//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Transaction};
use std::path::Path;

use super::traits::{CacheRequest, CachedEntry, CachedResponse, ResponseType};
use crate::db::schema::CACHE_SCHEMA;
use crate::db::Database;

/// Trait for cache storage backends.
///
/// A backend holds any number of named buckets, each mapping request
/// identities to captured responses.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the bucket if it does not exist yet.
  fn open_bucket(&self, bucket: &str) -> Result<()>;

  /// Look up the stored response for a request.
  fn match_request(&self, bucket: &str, request: &CacheRequest) -> Result<Option<CachedEntry>>;

  /// Store a single response, replacing any previous entry for the request.
  fn put(&self, bucket: &str, request: &CacheRequest, response: &CachedResponse) -> Result<()>;

  /// Store several responses at once; either all are written or none are.
  fn put_all(&self, bucket: &str, entries: &[(CacheRequest, CachedResponse)]) -> Result<()>;

  /// Names of all existing buckets.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and its entries. Returns whether it existed.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// All entries of a bucket, oldest first.
  fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>>;
}

impl<S: CacheStorage + ?Sized> CacheStorage for Box<S> {
  fn open_bucket(&self, bucket: &str) -> Result<()> {
    (**self).open_bucket(bucket)
  }

  fn match_request(&self, bucket: &str, request: &CacheRequest) -> Result<Option<CachedEntry>> {
    (**self).match_request(bucket, request)
  }

  fn put(&self, bucket: &str, request: &CacheRequest, response: &CachedResponse) -> Result<()> {
    (**self).put(bucket, request, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(CacheRequest, CachedResponse)]) -> Result<()> {
    (**self).put_all(bucket, entries)
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    (**self).bucket_names()
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    (**self).delete_bucket(bucket)
  }

  fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>> {
    (**self).entries(bucket)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn open_bucket(&self, _bucket: &str) -> Result<()> {
    Ok(())
  }

  fn match_request(&self, _bucket: &str, _request: &CacheRequest) -> Result<Option<CachedEntry>> {
    Ok(None) // Always miss
  }

  fn put(&self, _bucket: &str, _request: &CacheRequest, _response: &CachedResponse) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_all(&self, _bucket: &str, _entries: &[(CacheRequest, CachedResponse)]) -> Result<()> {
    Ok(()) // Discard
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_bucket(&self, _bucket: &str) -> Result<bool> {
    Ok(false)
  }

  fn entries(&self, _bucket: &str) -> Result<Vec<CachedEntry>> {
    Ok(Vec::new())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    Ok(Self {
      db: Database::open(path, CACHE_SCHEMA)?,
    })
  }

  /// Open a throwaway in-memory cache.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self {
      db: Database::open_in_memory(CACHE_SCHEMA)?,
    })
  }
}

fn insert_entry(
  tx: &Transaction<'_>,
  bucket: &str,
  request: &CacheRequest,
  response: &CachedResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  tx.execute(
    "INSERT OR REPLACE INTO cache_entries
       (bucket, request_hash, method, url, status, response_type, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      bucket,
      request.cache_key(),
      request.method.to_uppercase(),
      request.url.as_str(),
      response.status,
      response.response_type.as_str(),
      headers,
      response.body,
    ],
  )
  .map_err(|e| eyre!("Failed to store cache entry for {}: {}", request.url, e))?;

  Ok(())
}

fn ensure_bucket(tx: &Transaction<'_>, bucket: &str) -> Result<()> {
  tx.execute(
    "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
    params![bucket],
  )
  .map_err(|e| eyre!("Failed to create bucket {}: {}", bucket, e))?;
  Ok(())
}

fn row_to_entry(
  method: String,
  url: String,
  status: u16,
  response_type: String,
  headers: String,
  body: Vec<u8>,
  cached_at: String,
) -> Result<CachedEntry> {
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

  Ok(CachedEntry {
    method,
    response: CachedResponse {
      status,
      headers,
      body,
      response_type: ResponseType::parse(&response_type)?,
    },
    cached_at: parse_datetime(&cached_at)?,
    url,
  })
}

type EntryRow = (String, String, u16, String, String, Vec<u8>, String);

impl CacheStorage for SqliteStorage {
  fn open_bucket(&self, bucket: &str) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    ensure_bucket(&tx, bucket)?;
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn match_request(&self, bucket: &str, request: &CacheRequest) -> Result<Option<CachedEntry>> {
    let conn = self.db.lock()?;

    let row: Option<EntryRow> = conn
      .query_row(
        "SELECT method, url, status, response_type, headers, body, cached_at
         FROM cache_entries WHERE bucket = ? AND request_hash = ?",
        params![bucket, request.cache_key()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    row
      .map(|(method, url, status, response_type, headers, body, cached_at)| {
        row_to_entry(method, url, status, response_type, headers, body, cached_at)
      })
      .transpose()
  }

  fn put(&self, bucket: &str, request: &CacheRequest, response: &CachedResponse) -> Result<()> {
    self.put_all(bucket, &[(request.clone(), response.clone())])
  }

  fn put_all(&self, bucket: &str, entries: &[(CacheRequest, CachedResponse)]) -> Result<()> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_bucket(&tx, bucket)?;
    for (request, response) in entries {
      insert_entry(&tx, bucket, request, response)?;
    }

    // Dropping the transaction on an early return above rolls everything back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare bucket query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let mut conn = self.db.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", bucket, e))?;
    let removed = tx
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn entries(&self, bucket: &str) -> Result<Vec<CachedEntry>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT method, url, status, response_type, headers, body, cached_at
         FROM cache_entries WHERE bucket = ? ORDER BY cached_at, url",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let rows = stmt
      .query_map(params![bucket], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .collect::<rusqlite::Result<Vec<EntryRow>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    rows
      .into_iter()
      .map(|(method, url, status, response_type, headers, body, cached_at)| {
        row_to_entry(method, url, status, response_type, headers, body, cached_at)
      })
      .collect()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
