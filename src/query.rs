//! Read-side projections over the cached-story collection.
//!
//! Search, filter, sort, stats, pagination, and the favorites export all
//! operate on snapshots read from the store and return fresh values; nothing
//! in this module mutates a collection.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{FavoriteExportEntry, FavoritesExport, Stats, Story};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
  CreatedAt,
  CachedAt,
  Name,
  Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
  Ascending,
  Descending,
}

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
  pub field: SortField,
  pub direction: SortDirection,
}

/// Inclusive creation-date bounds.
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

/// Composable predicates, applied in declaration order: location, then date
/// range, then favorites-only. Each narrows the previous result set.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
  pub has_location: bool,
  pub date_range: Option<DateRange>,
  pub favorites_only: bool,
}

/// One page of cached stories.
#[derive(Debug, Clone)]
pub struct Page {
  pub stories: Vec<Story>,
  pub total: usize,
  pub page: usize,
  pub page_size: usize,
  pub total_pages: usize,
}

/// Case-insensitive substring match over name and description. An empty or
/// whitespace-only query returns every cached story. Results are always
/// newest-first by `created_at`, regardless of match order.
pub async fn search(store: &Store, query: &str) -> Result<Vec<Story>, StoreError> {
  let mut stories = store.get_stories().await?;
  let term = query.trim().to_lowercase();
  if !term.is_empty() {
    stories.retain(|s| {
      s.name.to_lowercase().contains(&term) || s.description.to_lowercase().contains(&term)
    });
  }
  stories.sort_by(|a, b| created_ts(b).cmp(&created_ts(a)));
  Ok(stories)
}

/// Apply `criteria` conjunctively over the cached collection.
pub async fn filter(store: &Store, criteria: &FilterCriteria) -> Result<Vec<Story>, StoreError> {
  let mut stories = store.get_stories().await?;

  if criteria.has_location {
    stories.retain(|s| s.lat.is_some() && s.lon.is_some());
  }

  if let Some(range) = &criteria.date_range {
    stories.retain(|s| match s.created_at_ts() {
      Some(ts) => ts >= range.start && ts <= range.end,
      None => false,
    });
  }

  if criteria.favorites_only {
    let favorite_ids: HashSet<String> = store
      .get_favorites()
      .await?
      .into_iter()
      .map(|f| f.story_id)
      .collect();
    stories.retain(|s| favorite_ids.contains(&s.id));
  }

  Ok(stories)
}

/// Sort the cached collection.
pub async fn sort(
  store: &Store,
  primary: SortSpec,
  secondary: Option<SortSpec>,
) -> Result<Vec<Story>, StoreError> {
  Ok(sort_stories(store.get_stories().await?, primary, secondary))
}

/// Stable two-level sort. The direction flips the sign of each level's
/// comparison rather than reversing the final order, so secondary tie-breaks
/// stay correct when the primary is descending.
pub fn sort_stories(
  mut stories: Vec<Story>,
  primary: SortSpec,
  secondary: Option<SortSpec>,
) -> Vec<Story> {
  stories.sort_by(|a, b| {
    let ordering = directed(compare_field(a, b, primary.field), primary.direction);
    if ordering == Ordering::Equal {
      if let Some(spec) = secondary {
        return directed(compare_field(a, b, spec.field), spec.direction);
      }
    }
    ordering
  });
  stories
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
  match direction {
    SortDirection::Ascending => ordering,
    SortDirection::Descending => ordering.reverse(),
  }
}

fn compare_field(a: &Story, b: &Story, field: SortField) -> Ordering {
  match field {
    // Date fields compare as timestamps, not as strings.
    SortField::CreatedAt => created_ts(a).cmp(&created_ts(b)),
    SortField::CachedAt => a
      .cached_at_ts()
      .unwrap_or(DateTime::<Utc>::MIN_UTC)
      .cmp(&b.cached_at_ts().unwrap_or(DateTime::<Utc>::MIN_UTC)),
    SortField::Name => a.name.cmp(&b.name),
    SortField::Description => a.description.cmp(&b.description),
  }
}

fn created_ts(story: &Story) -> DateTime<Utc> {
  story.created_at_ts().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Counters across all three collections.
pub async fn stats(store: &Store) -> Result<Stats, StoreError> {
  let stories = store.get_stories().await?;
  let offline = store.get_offline_stories().await?;
  let favorites = store.get_favorites().await?;

  Ok(Stats {
    total_stories: stories.len(),
    stories_with_location: stories
      .iter()
      .filter(|s| s.lat.is_some() && s.lon.is_some())
      .count(),
    unsynced_stories: offline.iter().filter(|s| s.is_pending()).count(),
    offline_stories: offline.len(),
    favorites: favorites.len(),
  })
}

/// One page of the cached collection, newest-first. Pages are 1-based.
pub async fn paginate(store: &Store, page: usize, page_size: usize) -> Result<Page, StoreError> {
  let all = search(store, "").await?;
  let total = all.len();
  let page_size = page_size.max(1);
  let page = page.max(1);
  let total_pages = total.div_ceil(page_size);

  let start = (page - 1).saturating_mul(page_size).min(total);
  let end = start.saturating_add(page_size).min(total);

  Ok(Page {
    stories: all[start..end].to_vec(),
    total,
    page,
    page_size,
    total_pages,
  })
}

/// Build the self-describing favorites export document.
pub async fn export_favorites(store: &Store) -> Result<FavoritesExport, StoreError> {
  let favorites = store.get_favorites().await?;
  Ok(FavoritesExport {
    exported_at: Utc::now().to_rfc3339(),
    total_favorites: favorites.len(),
    favorites: favorites
      .into_iter()
      .map(|f| FavoriteExportEntry {
        title: f.name,
        description: f.description,
        photo_url: f.photo_url,
        added_at: f.added_at,
      })
      .collect(),
  })
}
