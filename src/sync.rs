//! Reconciles locally-queued offline stories with the remote service.
//!
//! Each pending record moves PENDING -> SYNCING -> SYNCED, or falls back to
//! PENDING on failure and becomes eligible again on the next invocation.
//! Delivery is at-least-once: a success marks the record synced, it never
//! deletes it, so history stays visible until the user clears it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{StoryClient, StoryUpload};
use crate::config::RetryConfig;
use crate::error::{ApiError, StoreError};
use crate::model::OfflineStory;
use crate::store::Store;

/// Per-record retry policy: up to `max_attempts` tries with a fixed delay
/// between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 2,
      delay: Duration::from_millis(500),
    }
  }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(config: RetryConfig) -> Self {
    Self {
      max_attempts: config.max_attempts,
      delay: Duration::from_millis(config.delay_ms),
    }
  }
}

/// Why a single record failed to sync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncFailure {
  #[error("request timed out")]
  Timeout,
  #[error("network unreachable: {0}")]
  Network(String),
  #[error("rejected by service: {0}")]
  Rejected(String),
  #[error("local store failure: {0}")]
  Store(String),
}

impl From<ApiError> for SyncFailure {
  fn from(err: ApiError) -> Self {
    match err {
      ApiError::Timeout => SyncFailure::Timeout,
      ApiError::Network(msg) => SyncFailure::Network(msg),
      ApiError::Rejected { message } => SyncFailure::Rejected(message),
      ApiError::InvalidResponse(msg) => SyncFailure::Rejected(msg),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSync {
  pub id: i64,
  pub reason: SyncFailure,
}

/// Outcome of a [`SyncEngine::sync_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub successful: Vec<i64>,
  pub failed: Vec<FailedSync>,
}

/// Drains the offline queue against the remote service.
pub struct SyncEngine {
  store: Arc<Store>,
  client: StoryClient,
  retry: RetryPolicy,
}

impl SyncEngine {
  pub fn new(store: Arc<Store>, client: StoryClient, retry: RetryPolicy) -> Self {
    Self {
      store,
      client,
      retry,
    }
  }

  /// All records still awaiting upload. A missing `synced` field counts as
  /// pending, for records written before the field existed.
  pub async fn list_pending(&self) -> Result<Vec<OfflineStory>, StoreError> {
    self.store.list_unsynced_stories().await
  }

  /// Deliver one record. On acknowledged success the record is marked
  /// synced in the store, preserving its id and every other field; on
  /// failure it is left untouched and the reason reported.
  pub async fn sync_one(&self, record: &OfflineStory) -> Result<(), SyncFailure> {
    debug!(id = record.id, "syncing offline story");
    let upload = StoryUpload {
      description: &record.description,
      photo: &record.photo,
      lat: record.lat,
      lon: record.lon,
    };

    let max_attempts = self.retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
      attempt += 1;
      match self.client.post_story(upload).await {
        Ok(()) => {
          self
            .store
            .mark_offline_story_synced(record.id)
            .await
            .map_err(|e| SyncFailure::Store(e.to_string()))?;
          info!(id = record.id, "offline story synced");
          return Ok(());
        }
        Err(err) => {
          warn!(id = record.id, attempt, error = %err, "sync attempt failed");
          if attempt >= max_attempts {
            return Err(err.into());
          }
          tokio::time::sleep(self.retry.delay).await;
        }
      }
    }
  }

  /// Drain the pending queue sequentially. One record per attempt keeps the
  /// load on the remote endpoint bounded and the accounting deterministic.
  /// A failing record never blocks the ones after it, and an empty queue
  /// returns without touching the network. This never errors: store
  /// failures degrade to an empty report.
  pub async fn sync_all(&self) -> SyncReport {
    let pending = match self.list_pending().await {
      Ok(pending) => pending,
      Err(err) => {
        warn!(error = %err, "could not list pending stories");
        return SyncReport::default();
      }
    };

    if pending.is_empty() {
      debug!("no offline stories to sync");
      return SyncReport::default();
    }

    info!(count = pending.len(), "starting offline story sync");
    let mut report = SyncReport::default();
    for record in &pending {
      match self.sync_one(record).await {
        Ok(()) => report.successful.push(record.id),
        Err(reason) => report.failed.push(FailedSync {
          id: record.id,
          reason,
        }),
      }
    }

    info!(
      successful = report.successful.len(),
      failed = report.failed.len(),
      "offline story sync finished"
    );
    report
  }
}
