//! Offline-first synchronization for purchase entries.
//!
//! Writes are queued in a durable local store before any network call and
//! replayed against the remote authority by the [`SyncEngine`] whenever the
//! [`OfflineController`] sees connectivity. After each replay the local
//! entries cache is replaced with the authoritative list.
//!
//! ```ignore
//! let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::at_default_path()?);
//! store.initialize().await?;
//! let engine = Arc::new(SyncEngine::new(store.clone(), remote, SyncConfig::default()));
//! let controller = OfflineController::start(store, engine, Connectivity::new(true));
//!
//! controller.queue_add(EntryData::new("Milk", 50.0, "2024-01-01")).await?;
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use connectivity::Connectivity;
pub use error::{QueueError, RemoteError, StoreError, SyncError};
pub use lifecycle::OfflineController;
pub use models::{Entry, EntryData, EntryId, MutationPayload, PendingMutation};
pub use remote::{HttpRemote, RemoteAuthority};
pub use store::{LocalStore, MemoryStore, SqliteStore};
pub use sync::{SyncEngine, SyncOutcome, SyncReport, SyncStatus};
