//! Error taxonomy for the core library.

use thiserror::Error;

/// Failures of the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Persistent storage cannot be opened at all. Callers should degrade to
  /// network-only behavior.
  #[error("persistent storage unavailable: {0}")]
  Unavailable(String),

  /// Another open connection holds the database locked. Callers should
  /// prompt the user to close other sessions.
  #[error("database is locked by another session")]
  Blocked,

  #[error("database error: {0}")]
  Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
  fn from(err: rusqlite::Error) -> Self {
    if let rusqlite::Error::SqliteFailure(inner, _) = &err {
      if matches!(
        inner.code,
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
      ) {
        return StoreError::Blocked;
      }
    }
    StoreError::Sqlite(err)
  }
}

/// Failures of calls against the remote story service.
///
/// Timeout and Network are kept distinct so callers can present
/// "server slow" and "network unreachable" differently.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("request timed out")]
  Timeout,

  #[error("network error: {0}")]
  Network(String),

  /// The service answered with its error envelope.
  #[error("service rejected the request: {message}")]
  Rejected { message: String },

  #[error("unexpected response from service: {0}")]
  InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      ApiError::Timeout
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

/// Malformed input to a write operation, rejected before it reaches the
/// store.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
  pub field: &'static str,
  pub reason: &'static str,
}
