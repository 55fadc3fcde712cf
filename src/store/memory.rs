//! Process-local store for sessions where the durable store is unavailable.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::traits::LocalStore;
use crate::error::StoreError;
use crate::models::{Entry, EntryId, PendingMutation};

#[derive(Default)]
struct Collections {
  entries: BTreeMap<EntryId, Entry>,
  /// Keyed by mutation id; the sequence number records insertion order
  mutations: HashMap<String, (u64, PendingMutation)>,
  next_seq: u64,
}

/// In-memory store with the same semantics as `SqliteStore`, minus durability.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Option<Collections>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_collections<T>(
    &self,
    f: impl FnOnce(&mut Collections) -> T,
  ) -> Result<T, StoreError> {
    let mut guard = self.lock()?;
    let collections = guard
      .as_mut()
      .ok_or_else(|| StoreError::Unavailable("Store has not been initialized".to_string()))?;
    Ok(f(collections))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Option<Collections>>, StoreError> {
    self
      .inner
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {}", e)))
  }
}

#[async_trait]
impl LocalStore for MemoryStore {
  async fn initialize(&self) -> Result<(), StoreError> {
    let mut guard = self.lock()?;
    if guard.is_none() {
      *guard = Some(Collections::default());
    }
    Ok(())
  }

  async fn close(&self) -> Result<(), StoreError> {
    // Nothing survives a close; a later initialize starts empty
    *self.lock()? = None;
    Ok(())
  }

  async fn replace_entries_cache(&self, entries: &[Entry]) -> Result<(), StoreError> {
    self.with_collections(|c| {
      c.entries = entries.iter().map(|e| (e.id, e.clone())).collect();
    })
  }

  async fn read_entries_cache(&self) -> Result<Vec<Entry>, StoreError> {
    self.with_collections(|c| c.entries.values().cloned().collect())
  }

  async fn enqueue_mutation(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    self.with_collections(|c| {
      // An upsert counts as a fresh insert, as in SqliteStore
      let seq = c.next_seq;
      c.next_seq += 1;
      c.mutations.insert(mutation.id.clone(), (seq, mutation.clone()));
    })
  }

  async fn list_mutations(&self) -> Result<Vec<PendingMutation>, StoreError> {
    self.with_collections(|c| {
      let mut rows: Vec<_> = c.mutations.values().collect();
      rows.sort_by_key(|(seq, m)| (m.timestamp, *seq));
      rows.into_iter().map(|(_, m)| m.clone()).collect()
    })
  }

  async fn remove_mutation(&self, id: &str) -> Result<(), StoreError> {
    self.with_collections(|c| {
      c.mutations.remove(id);
    })
  }

  async fn clear_mutations(&self) -> Result<(), StoreError> {
    self.with_collections(|c| c.mutations.clear())
  }
}
