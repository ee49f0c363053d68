//! Schema and stepwise migrations for the story database.
//!
//! The schema version lives in `PRAGMA user_version`. Version 1 creates the
//! three collections with their indexes; every later step only adds what is
//! missing. Migrations never drop or rewrite existing rows, and re-running
//! against an already-migrated database is a no-op.

use rusqlite::Connection;

use crate::error::StoreError;

/// Current schema version. Consumers may only assume "current >= every
/// version these migrations define".
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    lat REAL,
    lon REAL,
    created_at TEXT NOT NULL,
    has_location INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stories_created_at ON stories(created_at);
CREATE INDEX IF NOT EXISTS idx_stories_has_location ON stories(has_location);
CREATE INDEX IF NOT EXISTS idx_stories_name ON stories(name);
CREATE INDEX IF NOT EXISTS idx_stories_description ON stories(description);

CREATE TABLE IF NOT EXISTS offline_stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    photo BLOB NOT NULL,
    lat REAL,
    lon REAL,
    created_at TEXT NOT NULL,
    synced INTEGER
);

CREATE INDEX IF NOT EXISTS idx_offline_stories_created_at ON offline_stories(created_at);
CREATE INDEX IF NOT EXISTS idx_offline_stories_synced ON offline_stories(synced);

CREATE TABLE IF NOT EXISTS favorites (
    story_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    added_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_favorites_added_at ON favorites(added_at);
"#;

// Version 2 backfills the synced index for databases written by builds that
// predate it.
const SCHEMA_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_offline_stories_synced ON offline_stories(synced);
"#;

/// Bring `conn` up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
  let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
  if version >= SCHEMA_VERSION {
    return Ok(());
  }

  tracing::info!(from = version, to = SCHEMA_VERSION, "migrating story database");

  if version < 1 {
    conn.execute_batch(SCHEMA_V1)?;
  }
  if version < 2 {
    conn.execute_batch(SCHEMA_V2)?;
  }

  conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
  Ok(())
}
