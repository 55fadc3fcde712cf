use std::fmt;

/// Coarse state of the sync engine.
///
/// `Idle` and `Error` are both resting states; a new pass may start from either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
  /// No pass running; the last pass (if any) completed
  #[default]
  Idle,
  /// A pass is draining the queue or refreshing the cache
  Syncing,
  /// The last pass stopped early; the cache holds the previous snapshot
  Error,
}

impl SyncStatus {
  pub fn is_syncing(&self) -> bool {
    matches!(self, SyncStatus::Syncing)
  }
}

impl fmt::Display for SyncStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Idle => write!(f, "idle"),
      Self::Syncing => write!(f, "syncing"),
      Self::Error => write!(f, "error"),
    }
  }
}

/// Counts from a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Mutations the remote authority accepted
  pub applied: usize,
  /// Mutations whose remote call failed and were dropped from the queue
  pub discarded: usize,
  /// Entries in the refreshed cache
  pub cached: usize,
}

/// What a call to `SyncEngine::sync` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// Another pass was running; nothing was read or sent
  AlreadyRunning,
  /// The pass drained the queue and refreshed the cache
  Completed(SyncReport),
  /// The pass stopped early and the engine is in the error state
  Failed,
}
