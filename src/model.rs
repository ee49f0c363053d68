//! The three record kinds owned by the persistent store, plus the derived
//! documents built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Inline placeholder served when a story carries no usable photo URL.
pub const PHOTO_PLACEHOLDER: &str = "data:image/svg+xml;base64,PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHdpZHRoPSIyMDAiIGhlaWdodD0iMjAwIj48cmVjdCB3aWR0aD0iMTAwJSIgaGVpZ2h0PSIxMDAlIiBmaWxsPSIjZGRkIi8+PHRleHQgeD0iNTAlIiB5PSI1MCUiIGZvbnQtZmFtaWx5PSJBcmlhbCwgc2Fucy1zZXJpZiIgZm9udC1zaXplPSIxNCIgZmlsbD0iIzk5OSIgdGV4dC1hbmNob3I9Im1pZGRsZSIgZHk9Ii4zZW0iPk5vIHBob3RvIGF2YWlsYWJsZTwvdGV4dD48L3N2Zz4=";

/// A remote-origin story as held in the local cache.
///
/// `has_location` and `cached_at` are derived fields; they are always
/// computed by [`Story::from_remote`], never set ad hoc, so a record cannot
/// exist in a partially-computed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
  pub id: String,
  pub name: String,
  pub description: String,
  pub photo_url: String,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  /// ISO-8601 creation timestamp from the service.
  pub created_at: String,
  pub has_location: bool,
  /// ISO-8601 timestamp of the cache write.
  pub cached_at: String,
}

impl Story {
  /// Build a cached story from remote fields, normalizing the photo URL and
  /// computing the derived columns.
  pub fn from_remote(
    id: String,
    name: String,
    description: String,
    photo_url: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    created_at: String,
  ) -> Self {
    let photo_url = match photo_url {
      Some(url) if url.starts_with("http") => url,
      _ => PHOTO_PLACEHOLDER.to_string(),
    };
    Self {
      id,
      name,
      description,
      photo_url,
      has_location: lat.is_some() && lon.is_some(),
      lat,
      lon,
      created_at,
      cached_at: Utc::now().to_rfc3339(),
    }
  }

  /// `created_at` parsed as a UTC timestamp, if well-formed.
  pub fn created_at_ts(&self) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&self.created_at)
      .ok()
      .map(|t| t.with_timezone(&Utc))
  }

  /// `cached_at` parsed as a UTC timestamp, if well-formed.
  pub fn cached_at_ts(&self) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&self.cached_at)
      .ok()
      .map(|t| t.with_timezone(&Utc))
  }
}

/// A locally authored story awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineStory {
  /// Monotonic numeric key assigned by the store.
  pub id: i64,
  pub description: String,
  /// Binary photo payload, uploaded as multipart on sync.
  pub photo: Vec<u8>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
  /// ISO-8601 timestamp assigned at creation.
  pub created_at: String,
  /// None on records created before the field existed; treated as false.
  pub synced: Option<bool>,
}

impl OfflineStory {
  pub fn is_pending(&self) -> bool {
    !self.synced.unwrap_or(false)
  }
}

/// Validated input for authoring a story. Construction is the validation
/// boundary: a draft that exists is safe to queue or upload.
#[derive(Debug, Clone)]
pub struct OfflineStoryDraft {
  pub description: String,
  pub photo: Vec<u8>,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

impl OfflineStoryDraft {
  pub fn new(
    description: String,
    photo: Vec<u8>,
    lat: Option<f64>,
    lon: Option<f64>,
  ) -> Result<Self, ValidationError> {
    if description.trim().is_empty() {
      return Err(ValidationError {
        field: "description",
        reason: "must not be empty",
      });
    }
    if photo.is_empty() {
      return Err(ValidationError {
        field: "photo",
        reason: "must not be empty",
      });
    }
    if let Some(lat) = lat {
      if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError {
          field: "lat",
          reason: "must be within -90..=90",
        });
      }
    }
    if let Some(lon) = lon {
      if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError {
          field: "lon",
          reason: "must be within -180..=180",
        });
      }
    }
    Ok(Self {
      description,
      photo,
      lat,
      lon,
    })
  }
}

/// A user-curated bookmark: a back-reference to a story's id plus a
/// denormalized snapshot of its display fields, so it stays viewable after
/// the cached story is evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
  pub story_id: String,
  pub name: String,
  pub description: String,
  pub photo_url: String,
  /// ISO-8601 timestamp of the first add.
  pub added_at: String,
}

impl Favorite {
  pub fn of_story(story: &Story) -> Self {
    Self {
      story_id: story.id.clone(),
      name: story.name.clone(),
      description: story.description.clone(),
      photo_url: story.photo_url.clone(),
      added_at: Utc::now().to_rfc3339(),
    }
  }
}

/// Counters over the three collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
  pub total_stories: usize,
  pub stories_with_location: usize,
  pub offline_stories: usize,
  pub unsynced_stories: usize,
  pub favorites: usize,
}

/// Self-describing export document for favorites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesExport {
  /// ISO-8601 timestamp of the export.
  pub exported_at: String,
  pub total_favorites: usize,
  pub favorites: Vec<FavoriteExportEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteExportEntry {
  pub title: String,
  pub description: String,
  pub photo_url: String,
  pub added_at: String,
}
