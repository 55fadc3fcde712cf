//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SyncConfig;
use crate::error::{RemoteError, StoreError};
use crate::models::{Entry, EntryData, EntryId, PendingMutation};
use crate::remote::RemoteAuthority;
use crate::store::{LocalStore, MemoryStore};
use crate::sync::{SyncEngine, SyncStatus};

/// A remote call as seen by `FakeRemote`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  Add(String),
  Update(EntryId),
  Delete(EntryId),
  List,
}

/// In-memory entries service that records every call.
pub struct FakeRemote {
  entries: Mutex<Vec<Entry>>,
  next_id: AtomicI64,
  calls: Mutex<Vec<Call>>,
  failing: Mutex<Vec<Call>>,
  delay: Mutex<Option<Duration>>,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::with_entries(Vec::new())
  }

  pub fn with_entries(entries: Vec<Entry>) -> Self {
    let next_id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
    Self {
      entries: Mutex::new(entries),
      next_id: AtomicI64::new(next_id),
      calls: Mutex::new(Vec::new()),
      failing: Mutex::new(Vec::new()),
      delay: Mutex::new(None),
    }
  }

  /// Make every call equal to `call` fail with a server error.
  pub fn fail_on(&self, call: Call) {
    self.failing.lock().unwrap().push(call);
  }

  /// Sleep this long at the start of every call.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn entries(&self) -> Vec<Entry> {
    self.entries.lock().unwrap().clone()
  }

  async fn record(&self, call: Call) -> Result<(), RemoteError> {
    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    self.calls.lock().unwrap().push(call.clone());
    if self.failing.lock().unwrap().contains(&call) {
      return Err(RemoteError::ServerError(format!("{:?} rejected", call)));
    }
    Ok(())
  }
}

#[async_trait]
impl RemoteAuthority for FakeRemote {
  async fn add_entry(&self, data: &EntryData) -> Result<Entry, RemoteError> {
    self.record(Call::Add(data.item.clone())).await?;
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let entry = Entry::from_data(id, data.clone());
    self.entries.lock().unwrap().push(entry.clone());
    Ok(entry)
  }

  async fn update_entry(&self, id: EntryId, data: &EntryData) -> Result<(), RemoteError> {
    self.record(Call::Update(id)).await?;
    let mut entries = self.entries.lock().unwrap();
    match entries.iter_mut().find(|e| e.id == id) {
      Some(entry) => {
        *entry = Entry::from_data(id, data.clone());
        Ok(())
      }
      None => Err(RemoteError::NotFound(id.to_string())),
    }
  }

  async fn delete_entry(&self, id: EntryId) -> Result<(), RemoteError> {
    self.record(Call::Delete(id)).await?;
    self.entries.lock().unwrap().retain(|e| e.id != id);
    Ok(())
  }

  async fn list_entries(&self) -> Result<Vec<Entry>, RemoteError> {
    self.record(Call::List).await?;
    Ok(self.entries())
  }
}

/// Wraps a `MemoryStore`, counting queue reads and injecting failures.
#[derive(Default)]
pub struct FlakyStore {
  inner: MemoryStore,
  pub list_calls: AtomicUsize,
  pub fail_enqueue: AtomicBool,
  pub fail_list: AtomicBool,
  pub fail_replace: AtomicBool,
  pub fail_remove: AtomicBool,
}

impl FlakyStore {
  pub async fn new() -> Self {
    let store = Self::default();
    store.inner.initialize().await.unwrap();
    store
  }
}

#[async_trait]
impl LocalStore for FlakyStore {
  async fn initialize(&self) -> Result<(), StoreError> {
    self.inner.initialize().await
  }

  async fn close(&self) -> Result<(), StoreError> {
    self.inner.close().await
  }

  async fn replace_entries_cache(&self, entries: &[Entry]) -> Result<(), StoreError> {
    if self.fail_replace.load(Ordering::SeqCst) {
      return Err(StoreError::Corrupt("replace failed".to_string()));
    }
    self.inner.replace_entries_cache(entries).await
  }

  async fn read_entries_cache(&self) -> Result<Vec<Entry>, StoreError> {
    self.inner.read_entries_cache().await
  }

  async fn enqueue_mutation(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    if self.fail_enqueue.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("storage disabled".to_string()));
    }
    self.inner.enqueue_mutation(mutation).await
  }

  async fn list_mutations(&self) -> Result<Vec<PendingMutation>, StoreError> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_list.load(Ordering::SeqCst) {
      return Err(StoreError::Corrupt("queue unreadable".to_string()));
    }
    self.inner.list_mutations().await
  }

  async fn remove_mutation(&self, id: &str) -> Result<(), StoreError> {
    if self.fail_remove.load(Ordering::SeqCst) {
      return Err(StoreError::Corrupt("remove failed".to_string()));
    }
    self.inner.remove_mutation(id).await
  }

  async fn clear_mutations(&self) -> Result<(), StoreError> {
    self.inner.clear_mutations().await
  }
}

pub fn entry(id: EntryId, item: &str) -> Entry {
  Entry::from_data(id, EntryData::new(item, 10.0, "2024-01-01"))
}

pub fn engine(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteAuthority>) -> Arc<SyncEngine> {
  Arc::new(SyncEngine::new(store, remote, SyncConfig::default()))
}

/// Wait until the engine reports `status`, failing the test after a second.
pub async fn wait_for_status(engine: &SyncEngine, status: SyncStatus) {
  let mut rx = engine.status_receiver();
  tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == status))
    .await
    .expect("timed out waiting for sync status")
    .expect("status channel closed");
}
