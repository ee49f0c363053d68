//! Durable, versioned, indexed storage for the three story collections.
//!
//! The connection is established lazily: the first operation opens the
//! database and runs migrations, and concurrent callers racing that first
//! open all await the same in-flight attempt. Before every operation the
//! live handle is pinged with a trivial read; a dead handle is discarded and
//! the operation retried once on a fresh connection.

pub mod schema;

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::{Favorite, OfflineStory, OfflineStoryDraft, Story};

#[derive(Debug)]
enum Target {
  File(PathBuf),
  Memory,
}

/// Handle to the story database. One instance per process, constructed at
/// the composition root and shared by `Arc`; every public operation is
/// self-contained and safe to call from concurrent call sites.
pub struct Store {
  target: Target,
  conn: Mutex<Option<Connection>>,
}

impl Store {
  /// Store backed by the database file at `path`.
  pub fn at_path(path: PathBuf) -> Self {
    Self {
      target: Target::File(path),
      conn: Mutex::new(None),
    }
  }

  /// Store at the default platform data directory.
  pub fn open_default() -> Result<Self, StoreError> {
    Ok(Self::at_path(Self::default_path()?))
  }

  /// In-memory store. Used by tests; a lost connection loses the data.
  pub fn in_memory() -> Self {
    Self {
      target: Target::Memory,
      conn: Mutex::new(None),
    }
  }

  fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".into()))?;
    Ok(data_dir.join("storymap").join("stories.db"))
  }

  /// Open the database eagerly. Optional; any operation opens it on demand.
  pub async fn initialize(&self) -> Result<(), StoreError> {
    let mut guard = self.conn.lock().await;
    self.ensure_open(&mut guard)?;
    Ok(())
  }

  fn connect(&self) -> Result<Connection, StoreError> {
    let conn = match &self.target {
      Target::Memory => Connection::open_in_memory()
        .map_err(|e| StoreError::Unavailable(e.to_string()))?,
      Target::File(path) => {
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!(
              "failed to create data directory {}: {}",
              parent.display(),
              e
            ))
          })?;
        }
        Connection::open(path).map_err(|e| {
          StoreError::Unavailable(format!("failed to open database at {}: {}", path.display(), e))
        })?
      }
    };
    schema::migrate(&conn)?;
    Ok(conn)
  }

  /// Make sure `guard` holds a live connection, pinging an existing handle
  /// and reconnecting when the ping fails.
  fn ensure_open<'a>(
    &self,
    guard: &'a mut Option<Connection>,
  ) -> Result<&'a Connection, StoreError> {
    let alive = match guard.as_ref() {
      Some(conn) => conn
        .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .is_ok(),
      None => false,
    };
    if !alive {
      if guard.is_some() {
        debug!("store connection lost, reinitializing");
      }
      *guard = Some(self.connect()?);
    }
    guard
      .as_ref()
      .ok_or_else(|| StoreError::Unavailable("database connection not open".into()))
  }

  /// Run `op` against the live connection, retrying once on a fresh
  /// connection if it fails.
  async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
  where
    F: Fn(&Connection) -> rusqlite::Result<T>,
  {
    let mut guard = self.conn.lock().await;
    let conn = self.ensure_open(&mut guard)?;
    match op(conn) {
      Ok(value) => Ok(value),
      Err(first) => {
        warn!(error = %first, "store operation failed, retrying on a fresh connection");
        *guard = None;
        let conn = self.ensure_open(&mut guard)?;
        op(conn).map_err(StoreError::from)
      }
    }
  }

  // ==========================================================================
  // Cached stories
  // ==========================================================================

  /// Upsert a cached story by id.
  pub async fn put_story(&self, story: &Story) -> Result<(), StoreError> {
    self
      .with_conn(|conn| {
        conn.execute(
          "INSERT OR REPLACE INTO stories
             (id, name, description, photo_url, lat, lon, created_at, has_location, cached_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
          params![
            story.id,
            story.name,
            story.description,
            story.photo_url,
            story.lat,
            story.lon,
            story.created_at,
            story.has_location,
            story.cached_at,
          ],
        )?;
        Ok(())
      })
      .await
  }

  /// Replace the whole cached collection in one transaction. Readers never
  /// observe the cleared-but-not-yet-refilled state.
  pub async fn replace_all_stories(&self, stories: &[Story]) -> Result<(), StoreError> {
    self
      .with_conn(|conn| {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", [])?;
        let result: rusqlite::Result<()> = (|| {
          conn.execute("DELETE FROM stories", [])?;
          for story in stories {
            conn.execute(
              "INSERT OR REPLACE INTO stories
                 (id, name, description, photo_url, lat, lon, created_at, has_location, cached_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
              params![
                story.id,
                story.name,
                story.description,
                story.photo_url,
                story.lat,
                story.lon,
                story.created_at,
                story.has_location,
                story.cached_at,
              ],
            )?;
          }
          Ok(())
        })();
        match result {
          Ok(()) => {
            conn.execute("COMMIT", [])?;
            Ok(())
          }
          Err(err) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(err)
          }
        }
      })
      .await
  }

  pub async fn get_stories(&self) -> Result<Vec<Story>, StoreError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, name, description, photo_url, lat, lon, created_at, has_location, cached_at
           FROM stories",
        )?;
        let stories = stmt
          .query_map([], story_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stories)
      })
      .await
  }

  pub async fn get_story(&self, id: &str) -> Result<Option<Story>, StoreError> {
    self
      .with_conn(|conn| {
        conn
          .query_row(
            "SELECT id, name, description, photo_url, lat, lon, created_at, has_location, cached_at
             FROM stories WHERE id = ?",
            params![id],
            story_from_row,
          )
          .optional()
      })
      .await
  }

  /// Delete a cached story. Missing ids are a no-op.
  pub async fn delete_story(&self, id: &str) -> Result<(), StoreError> {
    self
      .with_conn(|conn| {
        conn.execute("DELETE FROM stories WHERE id = ?", params![id])?;
        Ok(())
      })
      .await
  }

  // ==========================================================================
  // Offline pending stories
  // ==========================================================================

  /// Queue a locally authored story. The store assigns the monotonic id and
  /// the creation timestamp, and the record starts unsynced.
  pub async fn save_offline_story(&self, draft: &OfflineStoryDraft) -> Result<i64, StoreError> {
    let created_at = Utc::now().to_rfc3339();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO offline_stories (description, photo, lat, lon, created_at, synced)
           VALUES (?, ?, ?, ?, ?, 0)",
          params![draft.description, draft.photo, draft.lat, draft.lon, created_at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
  }

  pub async fn get_offline_stories(&self) -> Result<Vec<OfflineStory>, StoreError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, description, photo, lat, lon, created_at, synced FROM offline_stories",
        )?;
        let stories = stmt
          .query_map([], offline_story_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stories)
      })
      .await
  }

  pub async fn get_offline_story(&self, id: i64) -> Result<Option<OfflineStory>, StoreError> {
    self
      .with_conn(|conn| {
        conn
          .query_row(
            "SELECT id, description, photo, lat, lon, created_at, synced
             FROM offline_stories WHERE id = ?",
            params![id],
            offline_story_from_row,
          )
          .optional()
      })
      .await
  }

  /// Pending records: `synced` false, or absent on records written before
  /// the column carried a value.
  pub async fn list_unsynced_stories(&self) -> Result<Vec<OfflineStory>, StoreError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, description, photo, lat, lon, created_at, synced
           FROM offline_stories WHERE synced IS NULL OR synced = 0",
        )?;
        let stories = stmt
          .query_map([], offline_story_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stories)
      })
      .await
  }

  /// Flip a pending record to synced, preserving every other field. A
  /// missing id is an idempotent no-op.
  pub async fn mark_offline_story_synced(&self, id: i64) -> Result<(), StoreError> {
    self
      .with_conn(move |conn| {
        let changed = conn.execute(
          "UPDATE offline_stories SET synced = 1 WHERE id = ?",
          params![id],
        )?;
        if changed == 0 {
          warn!(id, "offline story not found for marking as synced");
        }
        Ok(())
      })
      .await
  }

  /// Delete a queued story. Missing ids are a no-op.
  pub async fn delete_offline_story(&self, id: i64) -> Result<(), StoreError> {
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM offline_stories WHERE id = ?", params![id])?;
        Ok(())
      })
      .await
  }

  // ==========================================================================
  // Favorites
  // ==========================================================================

  /// Bookmark a story, snapshotting its display fields. Re-adding an
  /// existing favorite is a no-op that keeps the original `added_at`.
  pub async fn add_favorite(&self, story: &Story) -> Result<(), StoreError> {
    let favorite = Favorite::of_story(story);
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO favorites (story_id, name, description, photo_url, added_at)
           VALUES (?, ?, ?, ?, ?)",
          params![
            favorite.story_id,
            favorite.name,
            favorite.description,
            favorite.photo_url,
            favorite.added_at,
          ],
        )?;
        Ok(())
      })
      .await
  }

  /// Remove a bookmark. Missing ids are a no-op.
  pub async fn remove_favorite(&self, story_id: &str) -> Result<(), StoreError> {
    self
      .with_conn(move |conn| {
        conn.execute("DELETE FROM favorites WHERE story_id = ?", params![story_id])?;
        Ok(())
      })
      .await
  }

  pub async fn get_favorites(&self) -> Result<Vec<Favorite>, StoreError> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT story_id, name, description, photo_url, added_at FROM favorites",
        )?;
        let favorites = stmt
          .query_map([], favorite_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(favorites)
      })
      .await
  }

  pub async fn is_favorite(&self, story_id: &str) -> Result<bool, StoreError> {
    self
      .with_conn(move |conn| {
        let found: Option<i64> = conn
          .query_row(
            "SELECT 1 FROM favorites WHERE story_id = ?",
            params![story_id],
            |row| row.get(0),
          )
          .optional()?;
        Ok(found.is_some())
      })
      .await
  }

  // ==========================================================================
  // Maintenance
  // ==========================================================================

  /// Wipe all three collections in one transaction.
  pub async fn clear_all(&self) -> Result<(), StoreError> {
    self
      .with_conn(|conn| {
        conn.execute_batch(
          "BEGIN IMMEDIATE;
           DELETE FROM stories;
           DELETE FROM offline_stories;
           DELETE FROM favorites;
           COMMIT;",
        )
      })
      .await
  }
}

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
  Ok(Story {
    id: row.get(0)?,
    name: row.get(1)?,
    description: row.get(2)?,
    photo_url: row.get(3)?,
    lat: row.get(4)?,
    lon: row.get(5)?,
    created_at: row.get(6)?,
    has_location: row.get(7)?,
    cached_at: row.get(8)?,
  })
}

fn offline_story_from_row(row: &Row) -> rusqlite::Result<OfflineStory> {
  let synced: Option<i64> = row.get(6)?;
  Ok(OfflineStory {
    id: row.get(0)?,
    description: row.get(1)?,
    photo: row.get(2)?,
    lat: row.get(3)?,
    lon: row.get(4)?,
    created_at: row.get(5)?,
    synced: synced.map(|v| v != 0),
  })
}

fn favorite_from_row(row: &Row) -> rusqlite::Result<Favorite> {
  Ok(Favorite {
    story_id: row.get(0)?,
    name: row.get(1)?,
    description: row.get(2)?,
    photo_url: row.get(3)?,
    added_at: row.get(4)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::sync::Arc;

  fn story(id: &str, created_at: &str) -> Story {
    Story::from_remote(
      id.into(),
      format!("author-{id}"),
      format!("story about {id}"),
      Some(format!("https://example.com/{id}.jpg")),
      Some(1.0),
      Some(2.0),
      created_at.into(),
    )
  }

  fn draft(description: &str) -> OfflineStoryDraft {
    OfflineStoryDraft::new(description.into(), vec![0xde, 0xad], None, None).unwrap()
  }

  #[tokio::test]
  async fn concurrent_initializers_share_one_connection() {
    let store = Arc::new(Store::in_memory());
    let tasks: Vec<_> = (0..4)
      .map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.initialize().await })
      })
      .collect();
    for task in tasks {
      task.await.unwrap().unwrap();
    }

    // Had a racer opened a second in-memory database, this write would land
    // in a connection later readers never see.
    store.put_story(&story("s1", "2024-05-01T10:00:00Z")).await.unwrap();
    assert_eq!(store.get_stories().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn put_story_is_idempotent() {
    let store = Store::in_memory();
    let s = story("s1", "2024-05-01T10:00:00Z");

    store.put_story(&s).await.unwrap();
    store.put_story(&s).await.unwrap();

    let all = store.get_stories().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "s1");
  }

  #[tokio::test]
  async fn replace_all_swaps_the_collection() {
    let store = Store::in_memory();
    store
      .replace_all_stories(&[story("a", "2024-05-01T10:00:00Z"), story("b", "2024-05-02T10:00:00Z")])
      .await
      .unwrap();

    store
      .replace_all_stories(&[
        story("c", "2024-05-03T10:00:00Z"),
        story("d", "2024-05-04T10:00:00Z"),
        story("e", "2024-05-05T10:00:00Z"),
      ])
      .await
      .unwrap();

    let ids: HashSet<String> = store
      .get_stories()
      .await
      .unwrap()
      .into_iter()
      .map(|s| s.id)
      .collect();
    assert_eq!(ids, HashSet::from(["c".into(), "d".into(), "e".into()]));
  }

  #[tokio::test]
  async fn replace_all_is_atomic_under_concurrent_reads() {
    let store = Arc::new(Store::in_memory());
    let old: Vec<Story> = (0..4)
      .map(|i| story(&format!("old-{i}"), "2024-05-01T10:00:00Z"))
      .collect();
    let new: Vec<Story> = (0..3)
      .map(|i| story(&format!("new-{i}"), "2024-06-01T10:00:00Z"))
      .collect();
    store.replace_all_stories(&old).await.unwrap();

    let reader = {
      let store = Arc::clone(&store);
      tokio::spawn(async move {
        for _ in 0..50 {
          let ids: HashSet<String> = store
            .get_stories()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
          let old_hits = ids.iter().filter(|id| id.starts_with("old-")).count();
          let new_hits = ids.iter().filter(|id| id.starts_with("new-")).count();
          // Either the full old set or the full new set; never a mix, never
          // a partial state.
          assert!(
            (old_hits == 4 && new_hits == 0) || (old_hits == 0 && new_hits == 3),
            "observed mixed replace state: {ids:?}"
          );
          tokio::task::yield_now().await;
        }
      })
    };

    for _ in 0..10 {
      store.replace_all_stories(&new).await.unwrap();
      store.replace_all_stories(&old).await.unwrap();
    }
    store.replace_all_stories(&new).await.unwrap();
    reader.await.unwrap();
  }

  #[tokio::test]
  async fn offline_ids_are_monotonic() {
    let store = Store::in_memory();
    let first = store.save_offline_story(&draft("first")).await.unwrap();
    let second = store.save_offline_story(&draft("second")).await.unwrap();
    assert!(second > first);
  }

  #[tokio::test]
  async fn mark_synced_preserves_other_fields() {
    let store = Store::in_memory();
    let id = store.save_offline_story(&draft("queued")).await.unwrap();

    store.mark_offline_story_synced(id).await.unwrap();

    let record = store.get_offline_story(id).await.unwrap().unwrap();
    assert_eq!(record.synced, Some(true));
    assert_eq!(record.id, id);
    assert_eq!(record.description, "queued");
    assert_eq!(record.photo, vec![0xde, 0xad]);
  }

  #[tokio::test]
  async fn mark_synced_on_missing_id_is_a_noop() {
    let store = Store::in_memory();
    store.mark_offline_story_synced(4242).await.unwrap();
  }

  #[tokio::test]
  async fn null_synced_counts_as_pending() {
    let store = Store::in_memory();
    // Record written by a build that predates the synced column carrying a
    // value.
    store
      .with_conn(|conn| {
        conn.execute(
          "INSERT INTO offline_stories (description, photo, created_at)
           VALUES ('legacy', x'01', '2024-01-01T00:00:00Z')",
          [],
        )?;
        Ok(())
      })
      .await
      .unwrap();

    let pending = store.list_unsynced_stories().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].description, "legacy");
    assert!(pending[0].is_pending());
  }

  #[tokio::test]
  async fn synced_records_are_not_pending() {
    let store = Store::in_memory();
    let id = store.save_offline_story(&draft("queued")).await.unwrap();
    store.save_offline_story(&draft("still pending")).await.unwrap();
    store.mark_offline_story_synced(id).await.unwrap();

    let pending = store.list_unsynced_stories().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].description, "still pending");
  }

  #[tokio::test]
  async fn favorites_are_unique_per_story() {
    let store = Store::in_memory();
    let s = story("x", "2024-05-01T10:00:00Z");

    store.add_favorite(&s).await.unwrap();
    let first = store.get_favorites().await.unwrap();
    store.add_favorite(&s).await.unwrap();
    let second = store.get_favorites().await.unwrap();

    assert_eq!(second.len(), 1);
    assert!(store.is_favorite("x").await.unwrap());
    // First add wins; re-adding does not refresh the timestamp.
    assert_eq!(first[0].added_at, second[0].added_at);
  }

  #[tokio::test]
  async fn remove_favorite_is_idempotent() {
    let store = Store::in_memory();
    let s = story("x", "2024-05-01T10:00:00Z");
    store.add_favorite(&s).await.unwrap();

    store.remove_favorite("x").await.unwrap();
    store.remove_favorite("x").await.unwrap();

    assert!(!store.is_favorite("x").await.unwrap());
  }

  #[tokio::test]
  async fn favorites_survive_story_eviction() {
    let store = Store::in_memory();
    let s = story("x", "2024-05-01T10:00:00Z");
    store.put_story(&s).await.unwrap();
    store.add_favorite(&s).await.unwrap();

    store.replace_all_stories(&[]).await.unwrap();

    let favorites = store.get_favorites().await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].name, s.name);
  }

  #[tokio::test]
  async fn clear_all_wipes_every_collection() {
    let store = Store::in_memory();
    let s = story("x", "2024-05-01T10:00:00Z");
    store.put_story(&s).await.unwrap();
    store.add_favorite(&s).await.unwrap();
    store.save_offline_story(&draft("queued")).await.unwrap();

    store.clear_all().await.unwrap();

    assert!(store.get_stories().await.unwrap().is_empty());
    assert!(store.get_favorites().await.unwrap().is_empty());
    assert!(store.get_offline_stories().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn delete_story_by_id() {
    let store = Store::in_memory();
    store.put_story(&story("x", "2024-05-01T10:00:00Z")).await.unwrap();
    store.delete_story("x").await.unwrap();
    assert!(store.get_story("x").await.unwrap().is_none());
    // Missing ids are fine.
    store.delete_story("x").await.unwrap();
  }
}
