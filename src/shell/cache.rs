//! Named response caches backed by SQLite.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// A stored HTTP response: enough to replay it to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    cache_name TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, url)
);
"#;

/// SQLite-backed storage for named caches, keyed by `(cache_name, url)`.
/// Writes go through single-statement upserts, so readers never observe a
/// half-written entry.
pub struct AssetCache {
  conn: Mutex<Connection>,
}

impl AssetCache {
  /// Open (creating if absent) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Unavailable(format!(
          "failed to create cache directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }
    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!("failed to open cache at {}: {}", path.display(), e))
    })?;
    Self::from_conn(conn)
  }

  /// In-memory cache for tests.
  pub fn in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
    Self::from_conn(conn)
  }

  fn from_conn(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("cache lock poisoned: {e}")))
  }

  /// Store a response under `cache_name` for an exact request URL.
  pub fn put(&self, cache_name: &str, url: &str, response: &CachedResponse) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO assets (cache_name, url, status, content_type, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        cache_name,
        url,
        response.status,
        response.content_type,
        response.body,
        Utc::now().to_rfc3339(),
      ],
    )?;
    Ok(())
  }

  /// Exact-match lookup within one named cache.
  pub fn lookup(&self, cache_name: &str, url: &str) -> Result<Option<CachedResponse>, StoreError> {
    let conn = self.lock()?;
    let found = conn
      .query_row(
        "SELECT status, content_type, body FROM assets WHERE cache_name = ? AND url = ?",
        params![cache_name, url],
        |row| {
          Ok(CachedResponse {
            status: row.get(0)?,
            content_type: row.get(1)?,
            body: row.get(2)?,
          })
        },
      )
      .optional()?;
    Ok(found)
  }

  /// All cache generations present in the database.
  pub fn cache_names(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT DISTINCT cache_name FROM assets")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  /// Drop a whole named cache. Returns the number of entries removed.
  pub fn delete_cache(&self, cache_name: &str) -> Result<usize, StoreError> {
    let conn = self.lock()?;
    let removed = conn.execute("DELETE FROM assets WHERE cache_name = ?", params![cache_name])?;
    Ok(removed)
  }
}
