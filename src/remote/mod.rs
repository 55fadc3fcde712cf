//! The remote authority that owns the canonical entry list.

mod http;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{Entry, EntryData, EntryId};

pub use http::HttpRemote;

/// Write and list operations of the entries service.
///
/// Implementations scope every call to the current user themselves; no
/// credentials pass through this trait.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
  /// Create an entry; the authority assigns its id.
  async fn add_entry(&self, data: &EntryData) -> Result<Entry, RemoteError>;

  async fn update_entry(&self, id: EntryId, data: &EntryData) -> Result<(), RemoteError>;

  async fn delete_entry(&self, id: EntryId) -> Result<(), RemoteError>;

  /// The full authoritative entry list.
  async fn list_entries(&self) -> Result<Vec<Entry>, RemoteError>;
}
