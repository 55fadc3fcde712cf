//! Error types for the local store, the remote authority and the sync engine.

use thiserror::Error;

/// Failures of the durable local store.
#[derive(Error, Debug)]
pub enum StoreError {
  /// The store could not be opened or accessed at all.
  #[error("Storage unavailable: {0}")]
  Unavailable(String),

  /// The store is open but a read or write failed unexpectedly.
  #[error("Storage corrupt: {0}")]
  Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    match e {
      rusqlite::Error::SqliteFailure(ref err, _)
        if matches!(
          err.code,
          rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::PermissionDenied
            | rusqlite::ErrorCode::ReadOnly
            | rusqlite::ErrorCode::DiskFull
        ) =>
      {
        StoreError::Unavailable(e.to_string())
      }
      _ => StoreError::Corrupt(e.to_string()),
    }
  }
}

impl From<serde_json::Error> for StoreError {
  fn from(e: serde_json::Error) -> Self {
    StoreError::Corrupt(format!("Failed to decode stored value: {}", e))
  }
}

/// Failures reported by the remote authority or the transport in front of it.
#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("Unauthorized - token may be expired")]
  Unauthorized,

  #[error("Access denied: {0}")]
  AccessDenied(String),

  #[error("Entry not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  ServerError(String),

  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status.as_u16() {
      401 => RemoteError::Unauthorized,
      403 => RemoteError::AccessDenied(truncated),
      404 => RemoteError::NotFound(truncated),
      429 => RemoteError::RateLimited,
      500..=599 => RemoteError::ServerError(truncated),
      _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }
}

/// A failure that escapes a sync pass and puts the engine into the error state.
///
/// Per-mutation remote failures never show up here; the engine logs and
/// discards those.
#[derive(Error, Debug)]
pub enum SyncError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Failed to fetch the authoritative entry list: {0}")]
  RemoteListFailed(#[source] RemoteError),
}

/// Errors returned to callers of the optimistic-write entry points.
#[derive(Error, Debug)]
pub enum QueueError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Invalid entry: {0}")]
  InvalidEntry(String),
}
