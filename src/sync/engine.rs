//! Sync engine: one pass at a time, sequential replay, wholesale cache refresh.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::status::{SyncOutcome, SyncReport, SyncStatus};
use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::models::{MutationPayload, PendingMutation};
use crate::queue;
use crate::remote::RemoteAuthority;
use crate::store::LocalStore;

/// Capacity of the transition stream; slow subscribers lag rather than block the engine
const TRANSITION_CAPACITY: usize = 64;

/// Drains the mutation queue against the remote authority.
///
/// The engine is shared (`Arc<SyncEngine>`) between the lifecycle controller
/// and the background tasks it spawns. `sync()` may be called from anywhere;
/// overlapping calls return `SyncOutcome::AlreadyRunning`.
pub struct SyncEngine {
  store: Arc<dyn LocalStore>,
  remote: Arc<dyn RemoteAuthority>,
  config: SyncConfig,
  /// Current status; also the re-entrancy lock (`Syncing` means held)
  state: Mutex<SyncStatus>,
  status_tx: watch::Sender<SyncStatus>,
  transitions_tx: broadcast::Sender<SyncStatus>,
}

/// Puts the engine into `Error` if a pass is dropped before it finishes.
struct PassGuard<'a> {
  engine: &'a SyncEngine,
  finished: bool,
}

impl PassGuard<'_> {
  fn finish(mut self, status: SyncStatus) {
    self.finished = true;
    self.engine.transition(status);
  }
}

impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    if !self.finished {
      warn!("Sync pass dropped before completion");
      self.engine.transition(SyncStatus::Error);
    }
  }
}

impl SyncEngine {
  pub fn new(
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteAuthority>,
    config: SyncConfig,
  ) -> Self {
    let (status_tx, _) = watch::channel(SyncStatus::Idle);
    let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);

    Self {
      store,
      remote,
      config,
      state: Mutex::new(SyncStatus::Idle),
      status_tx,
      transitions_tx,
    }
  }

  /// The current status.
  pub fn status(&self) -> SyncStatus {
    *self.status_tx.borrow()
  }

  /// Watch the current status; intermediate states may be skipped by slow readers.
  pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
    self.status_tx.subscribe()
  }

  /// Every transition, in order, starting from the next one.
  pub fn transitions(&self) -> broadcast::Receiver<SyncStatus> {
    self.transitions_tx.subscribe()
  }

  /// Run one sync pass unless one is already running.
  ///
  /// Never returns an error: per-mutation failures are logged and the
  /// mutation is dropped, and pass failures are logged and reported through
  /// the status.
  pub async fn sync(&self) -> SyncOutcome {
    let Some(guard) = self.try_begin() else {
      debug!("Sync already in progress, skipping");
      return SyncOutcome::AlreadyRunning;
    };

    match self.run_pass().await {
      Ok(report) => {
        info!(
          applied = report.applied,
          discarded = report.discarded,
          cached = report.cached,
          "Sync pass complete"
        );
        guard.finish(SyncStatus::Idle);
        SyncOutcome::Completed(report)
      }
      Err(e) => {
        error!(error = %e, "Sync pass failed");
        guard.finish(SyncStatus::Error);
        SyncOutcome::Failed
      }
    }
  }

  /// Take the re-entrancy lock and publish `Syncing`, or `None` if a pass is running.
  ///
  /// Runs before the first await of `sync()`.
  fn try_begin(&self) -> Option<PassGuard<'_>> {
    let mut state = self.lock_state();
    if state.is_syncing() {
      return None;
    }
    *state = SyncStatus::Syncing;
    self.publish(SyncStatus::Syncing);
    Some(PassGuard {
      engine: self,
      finished: false,
    })
  }

  fn transition(&self, status: SyncStatus) {
    let mut state = self.lock_state();
    *state = status;
    self.publish(status);
  }

  /// Notify observers. Called with the state lock held so transitions are
  /// published in the order they happen.
  fn publish(&self, status: SyncStatus) {
    self.status_tx.send_replace(status);
    // No subscribers is fine
    let _ = self.transitions_tx.send(status);
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, SyncStatus> {
    // The state is a plain Copy value; a poisoned lock still holds a valid one
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  async fn run_pass(&self) -> Result<SyncReport, SyncError> {
    let mut mutations = self.store.list_mutations().await?;
    if mutations.len() > self.config.queue_warn_threshold {
      warn!(
        pending = mutations.len(),
        threshold = self.config.queue_warn_threshold,
        "Mutation queue is unusually long"
      );
    }
    queue::sort_for_replay(&mut mutations);

    let mut report = SyncReport::default();
    for mutation in &mutations {
      match self.dispatch(mutation).await {
        Ok(()) => {
          debug!(mutation_id = %mutation.id, kind = mutation.kind(), "Mutation applied");
          report.applied += 1;
        }
        Err(e) => {
          // No retry: a stuck mutation must not block everything queued after it
          warn!(
            mutation_id = %mutation.id,
            kind = mutation.kind(),
            timestamp = mutation.timestamp,
            error = %e,
            "Remote operation failed, discarding mutation"
          );
          report.discarded += 1;
        }
      }
      self.store.remove_mutation(&mutation.id).await?;
    }

    let entries = self
      .remote
      .list_entries()
      .await
      .map_err(SyncError::RemoteListFailed)?;
    self.store.replace_entries_cache(&entries).await?;
    report.cached = entries.len();

    Ok(report)
  }

  async fn dispatch(&self, mutation: &PendingMutation) -> Result<(), RemoteError> {
    match &mutation.payload {
      MutationPayload::Add(data) => {
        let entry = self.remote.add_entry(data).await?;
        debug!(entry_id = entry.id, "Remote assigned id");
        Ok(())
      }
      MutationPayload::Edit { id, data } => self.remote.update_entry(*id, data).await,
      MutationPayload::Delete { id } => self.remote.delete_entry(*id).await,
    }
  }
}
