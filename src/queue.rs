//! Construction, ordering and projection of pending mutations.
//!
//! The cache only ever holds remote-confirmed entries. What the user sees is
//! that cache with the queue applied on top, oldest mutation first; see
//! [`project`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Entry, EntryData, EntryId, MutationPayload, PendingMutation};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

/// Millisecond stamps that strictly increase across calls, even when the
/// wall clock stalls or steps back.
#[derive(Debug, Default)]
pub struct ReplayClock {
  last: AtomicI64,
}

impl ReplayClock {
  pub fn new() -> Self {
    Self::default()
  }

  /// The next stamp: the wall clock, or one past the previous stamp if that is later.
  pub fn next(&self) -> i64 {
    self.next_after(now_millis())
  }

  fn next_after(&self, now: i64) -> i64 {
    let mut last = self.last.load(Ordering::SeqCst);
    loop {
      let next = now.max(last + 1);
      match self
        .last
        .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => return next,
        Err(current) => last = current,
      }
    }
  }
}

impl PendingMutation {
  /// A new mutation with a fresh id. Take `timestamp` from a [`ReplayClock`]
  /// so later writes replay later.
  pub fn with_timestamp(payload: MutationPayload, timestamp: i64) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      payload,
      timestamp,
    }
  }
}

/// Sort mutations into replay order: ascending timestamp, ties keep their
/// relative order.
pub fn sort_for_replay(mutations: &mut [PendingMutation]) {
  // sort_by_key is stable
  mutations.sort_by_key(|m| m.timestamp);
}

/// An entry as the user currently perceives it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedEntry {
  /// Remote id; `None` for entries whose add has not been replayed yet
  pub id: Option<EntryId>,
  pub data: EntryData,
  /// Id of the last pending mutation that touched this entry
  pub pending: Option<String>,
}

impl ProjectedEntry {
  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }
}

impl From<Entry> for ProjectedEntry {
  fn from(entry: Entry) -> Self {
    Self {
      id: Some(entry.id),
      data: entry.data(),
      pending: None,
    }
  }
}

/// Apply pending mutations, in replay order, on top of the cached entries.
///
/// Edits and deletes that target an id missing from the cache are skipped,
/// matching what the remote authority would do with them.
pub fn project(cache: Vec<Entry>, mut mutations: Vec<PendingMutation>) -> Vec<ProjectedEntry> {
  sort_for_replay(&mut mutations);

  let mut view: Vec<ProjectedEntry> = cache.into_iter().map(ProjectedEntry::from).collect();

  for mutation in mutations {
    match mutation.payload {
      MutationPayload::Add(data) => view.push(ProjectedEntry {
        id: None,
        data,
        pending: Some(mutation.id),
      }),
      MutationPayload::Edit { id, data } => {
        if let Some(existing) = view.iter_mut().find(|e| e.id == Some(id)) {
          existing.data = data;
          existing.pending = Some(mutation.id);
        }
      }
      MutationPayload::Delete { id } => view.retain(|e| e.id != Some(id)),
    }
  }

  view
}
