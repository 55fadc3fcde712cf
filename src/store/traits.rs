//! The local store contract shared by the sync engine and the lifecycle controller.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Entry, PendingMutation};

/// Durable local storage with two collections: the entries cache and the
/// pending-mutation queue.
///
/// Collection operations fail with `StoreError::Unavailable` until
/// `initialize()` has succeeded.
#[async_trait]
pub trait LocalStore: Send + Sync {
  /// Open the store, creating both collections if they are missing.
  ///
  /// Safe to call repeatedly; existing data is left untouched.
  async fn initialize(&self) -> Result<(), StoreError>;

  /// Release the underlying handle. Later calls fail until `initialize()` runs again.
  async fn close(&self) -> Result<(), StoreError>;

  /// Atomically replace the whole entries cache with `entries`.
  async fn replace_entries_cache(&self, entries: &[Entry]) -> Result<(), StoreError>;

  /// All cached entries, in no particular order.
  async fn read_entries_cache(&self) -> Result<Vec<Entry>, StoreError>;

  /// Persist a mutation keyed by its id, overwriting any mutation with the same id.
  async fn enqueue_mutation(&self, mutation: &PendingMutation) -> Result<(), StoreError>;

  /// All pending mutations, in no particular order.
  async fn list_mutations(&self) -> Result<Vec<PendingMutation>, StoreError>;

  /// Delete a mutation by id. Deleting an absent id is a no-op.
  async fn remove_mutation(&self, id: &str) -> Result<(), StoreError>;

  /// Empty the mutation queue.
  async fn clear_mutations(&self) -> Result<(), StoreError>;
}
