//! Offline lifecycle controller: optimistic-write entry points and
//! connectivity-driven sync.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connectivity::Connectivity;
use crate::error::{QueueError, StoreError};
use crate::models::{Entry, EntryData, EntryId, MutationPayload, PendingMutation};
use crate::queue::{self, ProjectedEntry, ReplayClock};
use crate::store::LocalStore;
use crate::sync::{SyncEngine, SyncOutcome, SyncStatus};

/// Front door for the application shell.
///
/// Writes go to the durable queue first and are replayed by the sync engine
/// whenever the controller believes it is online. Dropping the controller
/// stops the connectivity watcher; passes already running finish on their own.
pub struct OfflineController {
  store: Arc<dyn LocalStore>,
  engine: Arc<SyncEngine>,
  connectivity: Connectivity,
  /// Stamps both queued mutations and `last_action`
  clock: ReplayClock,
  last_action: watch::Sender<i64>,
  background: Background,
  watcher: JoinHandle<()>,
}

/// Handles of passes started in the background.
#[derive(Clone, Default)]
struct Background {
  passes: Arc<Mutex<Vec<JoinHandle<SyncOutcome>>>>,
}

impl Background {
  /// Run a pass in the background. The engine logs its own failures.
  fn spawn_sync(&self, engine: &Arc<SyncEngine>) {
    let engine = Arc::clone(engine);
    let handle = tokio::spawn(async move { engine.sync().await });

    let mut passes = self.lock();
    passes.retain(|h| !h.is_finished());
    passes.push(handle);
  }

  fn take(&self) -> Vec<JoinHandle<SyncOutcome>> {
    std::mem::take(&mut *self.lock())
  }

  fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<SyncOutcome>>> {
    // A Vec of handles stays usable after a panic elsewhere
    self
      .passes
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl OfflineController {
  /// Start the controller. Must be called from within a tokio runtime.
  ///
  /// `store` must already be initialized and be the same store the engine uses.
  /// If `connectivity` reports online, an initial pass is started to replay
  /// anything queued in an earlier session.
  pub fn start(
    store: Arc<dyn LocalStore>,
    engine: Arc<SyncEngine>,
    connectivity: Connectivity,
  ) -> Self {
    let background = Background::default();
    let mut rx = connectivity.subscribe();
    if *rx.borrow_and_update() {
      debug!("Online at startup, starting initial sync");
      background.spawn_sync(&engine);
    }

    let watcher = tokio::spawn({
      let engine = Arc::clone(&engine);
      let background = background.clone();
      async move {
        while rx.changed().await.is_ok() {
          let online = *rx.borrow_and_update();
          if online {
            info!("Connectivity restored, syncing");
            background.spawn_sync(&engine);
          } else {
            info!("Connectivity lost, queueing writes locally");
          }
        }
      }
    });

    let (last_action, _) = watch::channel(0);

    Self {
      store,
      engine,
      connectivity,
      clock: ReplayClock::new(),
      last_action,
      background,
      watcher,
    }
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  pub fn sync_status(&self) -> SyncStatus {
    self.engine.status()
  }

  pub fn engine(&self) -> &Arc<SyncEngine> {
    &self.engine
  }

  /// Marker bumped on every local write; strictly increasing.
  pub fn last_action(&self) -> i64 {
    *self.last_action.borrow()
  }

  /// Watch `last_action` to learn when the queue or cache changed locally.
  pub fn last_action_receiver(&self) -> watch::Receiver<i64> {
    self.last_action.subscribe()
  }

  /// Queue a new entry.
  pub async fn queue_add(&self, data: EntryData) -> Result<PendingMutation, QueueError> {
    data.validate()?;
    self.enqueue(MutationPayload::Add(data)).await
  }

  /// Queue new field values for an existing entry.
  pub async fn queue_edit(
    &self,
    id: EntryId,
    data: EntryData,
  ) -> Result<PendingMutation, QueueError> {
    data.validate()?;
    self.enqueue(MutationPayload::Edit { id, data }).await
  }

  /// Queue removal of an existing entry.
  pub async fn queue_delete(&self, id: EntryId) -> Result<PendingMutation, QueueError> {
    self.enqueue(MutationPayload::Delete { id }).await
  }

  async fn enqueue(&self, payload: MutationPayload) -> Result<PendingMutation, QueueError> {
    // Replay order follows this stamp, so it comes from the controller's clock
    let mutation = PendingMutation::with_timestamp(payload, self.clock.next());
    self.store.enqueue_mutation(&mutation).await?;
    self.touch();
    debug!(
      mutation_id = %mutation.id,
      kind = mutation.kind(),
      online = self.is_online(),
      "Mutation queued"
    );

    if self.is_online() {
      self.background.spawn_sync(&self.engine);
    }
    Ok(mutation)
  }

  /// Store an authoritative list fetched elsewhere, without a sync pass.
  pub async fn refresh_cache(&self, entries: &[Entry]) -> Result<(), StoreError> {
    self.store.replace_entries_cache(entries).await?;
    self.touch();
    Ok(())
  }

  /// Run a pass now and wait for it.
  pub async fn sync_now(&self) -> SyncOutcome {
    self.engine.sync().await
  }

  /// Cached entries, newest date first.
  pub async fn entries(&self) -> Result<Vec<Entry>, StoreError> {
    let mut entries = self.store.read_entries_cache().await?;
    entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    Ok(entries)
  }

  /// Pending mutations in replay order.
  pub async fn pending(&self) -> Result<Vec<PendingMutation>, StoreError> {
    let mut mutations = self.store.list_mutations().await?;
    queue::sort_for_replay(&mut mutations);
    Ok(mutations)
  }

  /// The cache with the pending queue applied: what the user should see.
  pub async fn projected_entries(&self) -> Result<Vec<ProjectedEntry>, StoreError> {
    let cache = self.store.read_entries_cache().await?;
    let mutations = self.store.list_mutations().await?;
    Ok(queue::project(cache, mutations))
  }

  /// Drop every pending mutation. Recovery tool; not part of normal operation.
  pub async fn clear_queue(&self) -> Result<(), StoreError> {
    self.store.clear_mutations().await?;
    self.touch();
    Ok(())
  }

  /// Wait for every pass started in the background so far.
  pub async fn wait_for_background(&self) {
    loop {
      let passes = self.background.take();
      if passes.is_empty() {
        return;
      }
      for pass in passes {
        // A cancelled pass has already put the engine into the error state
        let _ = pass.await;
      }
    }
  }

  /// Stop reacting to connectivity changes.
  pub fn shutdown(&self) {
    self.watcher.abort();
  }

  fn touch(&self) {
    let stamp = self.clock.next();
    self.last_action.send_modify(|last| {
      *last = stamp.max(*last + 1);
    });
  }
}

impl Drop for OfflineController {
  fn drop(&mut self) {
    self.watcher.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::Ordering;
  use std::time::Duration;

  use tokio::sync::broadcast;

  use crate::store::MemoryStore;
  use crate::testing::{engine, entry, Call, FakeRemote, FlakyStore};

  /// Wait for the next pass to end, failing the test after a second.
  async fn next_pass_end(transitions: &mut broadcast::Receiver<SyncStatus>) -> SyncStatus {
    tokio::time::timeout(Duration::from_secs(1), async {
      loop {
        match transitions.recv().await {
          Ok(SyncStatus::Syncing) => continue,
          Ok(status) => return status,
          Err(e) => panic!("transition stream closed: {}", e),
        }
      }
    })
    .await
    .expect("timed out waiting for a sync pass")
  }

  async fn setup(
    online: bool,
    remote: Arc<FakeRemote>,
  ) -> (OfflineController, Arc<MemoryStore>, Connectivity) {
    let store = Arc::new(MemoryStore::new());
    store.initialize().await.unwrap();
    let connectivity = Connectivity::new(online);
    let controller = OfflineController::start(
      store.clone(),
      engine(store.clone(), remote),
      connectivity.clone(),
    );
    (controller, store, connectivity)
  }

  #[tokio::test]
  async fn test_offline_add_then_reconnect() {
    let remote = Arc::new(FakeRemote::new());
    let (controller, store, connectivity) = setup(false, remote.clone()).await;
    let mut transitions = controller.engine().transitions();

    controller
      .queue_add(EntryData::new("Milk", 50.0, "2024-01-01"))
      .await
      .unwrap();

    let pending = store.list_mutations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind(), "add");
    assert!(remote.calls().is_empty());

    connectivity.set_online(true);
    assert_eq!(next_pass_end(&mut transitions).await, SyncStatus::Idle);

    assert!(store.list_mutations().await.unwrap().is_empty());
    let cache = store.read_entries_cache().await.unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0].item, "Milk");
    assert!(controller.is_online());
  }

  #[tokio::test]
  async fn test_online_write_triggers_sync() {
    let remote = Arc::new(FakeRemote::new());
    let (controller, store, _) = setup(true, remote.clone()).await;

    let mutation = controller
      .queue_add(EntryData::new("Tea", 3.0, "2024-02-01").with_note("green"))
      .await
      .unwrap();
    assert!(matches!(mutation.payload, MutationPayload::Add(_)));

    controller.wait_for_background().await;

    assert!(store.list_mutations().await.unwrap().is_empty());
    assert_eq!(
      remote
        .calls()
        .iter()
        .filter(|c| **c == Call::Add("Tea".to_string()))
        .count(),
      1
    );
    assert_eq!(remote.entries()[0].note.as_deref(), Some("green"));
    assert_eq!(controller.sync_status(), SyncStatus::Idle);
  }

  #[tokio::test]
  async fn test_startup_online_replays_previous_session() {
    let store = Arc::new(MemoryStore::new());
    store.initialize().await.unwrap();
    let previous = PendingMutation::with_timestamp(MutationPayload::Delete { id: 1 }, 1);
    store.enqueue_mutation(&previous).await.unwrap();
    let remote = Arc::new(FakeRemote::with_entries(vec![entry(1, "Milk")]));
    let engine = engine(store.clone(), remote.clone());
    let mut transitions = engine.transitions();

    let _controller = OfflineController::start(store.clone(), engine, Connectivity::new(true));

    assert_eq!(next_pass_end(&mut transitions).await, SyncStatus::Idle);
    assert_eq!(remote.calls(), vec![Call::Delete(1), Call::List]);
    assert!(store.read_entries_cache().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_going_offline_does_not_sync() {
    let remote = Arc::new(FakeRemote::new());
    let (controller, _, connectivity) = setup(false, remote.clone()).await;

    connectivity.set_online(false);
    connectivity.set_online(true);
    connectivity.set_online(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!controller.is_online());

    controller.queue_delete(3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Only the brief online window may have synced, and the delete came after it
    assert!(!remote.calls().contains(&Call::Delete(3)));
  }

  #[tokio::test]
  async fn test_storage_failure_surfaces_and_skips_sync() {
    let store = Arc::new(FlakyStore::new().await);
    let remote = Arc::new(FakeRemote::new());
    let engine = engine(store.clone(), remote.clone());
    let controller = OfflineController::start(store.clone(), engine, Connectivity::new(true));
    controller.wait_for_background().await;

    let list_calls = store.list_calls.load(Ordering::SeqCst);
    let remote_calls = remote.calls().len();
    let before = controller.last_action();
    store.fail_enqueue.store(true, Ordering::SeqCst);

    let err = controller
      .queue_add(EntryData::new("Milk", 50.0, "2024-01-01"))
      .await
      .unwrap_err();

    assert!(matches!(err, QueueError::Store(StoreError::Unavailable(_))));
    assert_eq!(controller.last_action(), before);

    controller.wait_for_background().await;
    assert_eq!(store.list_calls.load(Ordering::SeqCst), list_calls);
    assert_eq!(remote.calls().len(), remote_calls);
  }

  #[tokio::test]
  async fn test_back_to_back_edits_replay_in_call_order() {
    let remote = Arc::new(FakeRemote::with_entries(vec![entry(1, "original")]));
    let (controller, _, _) = setup(false, remote.clone()).await;
    controller.refresh_cache(&remote.entries()).await.unwrap();

    controller
      .queue_edit(1, EntryData::new("first", 1.0, "2024-01-01"))
      .await
      .unwrap();
    controller
      .queue_edit(1, EntryData::new("second", 2.0, "2024-01-01"))
      .await
      .unwrap();

    let pending = controller.pending().await.unwrap();
    assert!(pending[0].timestamp < pending[1].timestamp);

    let view = controller.projected_entries().await.unwrap();
    assert_eq!(view[0].data.item, "second");

    assert!(matches!(controller.sync_now().await, SyncOutcome::Completed(_)));
    assert_eq!(remote.calls(), vec![Call::Update(1), Call::Update(1), Call::List]);
    assert_eq!(remote.entries()[0].item, "second");
  }

  #[tokio::test]
  async fn test_invalid_entry_is_rejected_before_queueing() {
    let (controller, store, _) = setup(false, Arc::new(FakeRemote::new())).await;

    let err = controller
      .queue_edit(1, EntryData::new("", 1.0, "2024-01-01"))
      .await
      .unwrap_err();

    assert!(matches!(err, QueueError::InvalidEntry(_)));
    assert!(store.list_mutations().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_last_action_strictly_increases() {
    let (controller, _, _) = setup(false, Arc::new(FakeRemote::new())).await;
    let mut rx = controller.last_action_receiver();

    let mut previous = controller.last_action();
    for id in 0..5 {
      controller.queue_delete(id).await.unwrap();
      let current = controller.last_action();
      assert!(current > previous);
      previous = current;
    }

    controller.refresh_cache(&[entry(1, "Milk")]).await.unwrap();
    assert!(controller.last_action() > previous);
    assert!(rx.has_changed().unwrap());
  }

  #[tokio::test]
  async fn test_refresh_cache_and_views() {
    let (controller, _, _) = setup(false, Arc::new(FakeRemote::new())).await;

    let older = Entry::from_data(1, EntryData::new("Milk", 50.0, "2024-01-01"));
    let newer = Entry::from_data(2, EntryData::new("Bread", 20.0, "2024-03-01"));
    controller
      .refresh_cache(&[older.clone(), newer.clone()])
      .await
      .unwrap();
    assert_eq!(controller.entries().await.unwrap(), vec![newer, older]);

    controller.queue_delete(1).await.unwrap();
    controller
      .queue_add(EntryData::new("Eggs", 30.0, "2024-03-02"))
      .await
      .unwrap();

    let pending = controller.pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending[0].timestamp < pending[1].timestamp);

    let view = controller.projected_entries().await.unwrap();
    let items: Vec<_> = view.iter().map(|e| e.data.item.as_str()).collect();
    assert_eq!(items, vec!["Bread", "Eggs"]);
    assert!(view[1].is_pending());

    controller.clear_queue().await.unwrap();
    assert!(controller.pending().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_shutdown_stops_reacting_to_connectivity() {
    let remote = Arc::new(FakeRemote::new());
    let (controller, _, connectivity) = setup(false, remote.clone()).await;

    controller.shutdown();
    tokio::task::yield_now().await;
    connectivity.set_online(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(remote.calls().is_empty());
    assert_eq!(controller.sync_status(), SyncStatus::Idle);
  }
}
