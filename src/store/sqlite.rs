//! SQLite implementation of the local store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use super::traits::LocalStore;
use crate::error::StoreError;
use crate::models::{Entry, MutationPayload, PendingMutation};

/// Where the database lives.
#[derive(Debug, Clone)]
enum Location {
  File(PathBuf),
  Memory,
}

/// SQLite-backed local store.
///
/// The connection is opened by `initialize()` and dropped by `close()`.
pub struct SqliteStore {
  location: Location,
  conn: Mutex<Option<Connection>>,
}

/// Schema for both collections.
const STORE_SCHEMA: &str = r#"
-- Remote-confirmed entries, replaced wholesale on every sync pass
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY,
    data BLOB NOT NULL
);

-- Pending mutations keyed by their client-generated id
CREATE TABLE IF NOT EXISTS mutations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    data BLOB NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mutations_timestamp ON mutations(timestamp);
"#;

impl SqliteStore {
  /// A store backed by the database file at `path`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      location: Location::File(path.into()),
      conn: Mutex::new(None),
    }
  }

  /// A store at the default location.
  pub fn at_default_path() -> Result<Self, StoreError> {
    Ok(Self::new(Self::default_path()?))
  }

  /// A private in-memory database, lost when the store is closed or dropped.
  pub fn in_memory() -> Self {
    Self {
      location: Location::Memory,
      conn: Mutex::new(None),
    }
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("entry-sync").join("store.db"))
  }

  /// Path of the database file, if the store is file-backed.
  pub fn path(&self) -> Option<&Path> {
    match &self.location {
      Location::File(path) => Some(path),
      Location::Memory => None,
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {}", e)))
  }

  fn open_connection(&self) -> Result<Connection, StoreError> {
    let conn = match &self.location {
      Location::File(path) => {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create store directory: {}", e))
          })?;
        }
        Connection::open(path).map_err(|e| {
          StoreError::Unavailable(format!(
            "Failed to open store at {}: {}",
            path.display(),
            e
          ))
        })?
      }
      Location::Memory => Connection::open_in_memory()
        .map_err(|e| StoreError::Unavailable(format!("Failed to open in-memory store: {}", e)))?,
    };

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| StoreError::Unavailable(format!("Failed to create store tables: {}", e)))?;

    Ok(conn)
  }

  /// Run `f` against the open connection.
  fn with_conn<T>(
    &self,
    f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
  ) -> Result<T, StoreError> {
    let mut guard = self.lock()?;
    let conn = guard
      .as_mut()
      .ok_or_else(|| StoreError::Unavailable("Store has not been initialized".to_string()))?;
    f(conn)
  }
}

#[async_trait]
impl LocalStore for SqliteStore {
  async fn initialize(&self) -> Result<(), StoreError> {
    let mut guard = self.lock()?;
    if let Some(conn) = guard.as_ref() {
      // Every statement is IF NOT EXISTS, so existing tables are left alone
      conn.execute_batch(STORE_SCHEMA)?;
    } else {
      *guard = Some(self.open_connection()?);
    }
    debug!(location = ?self.location, "Local store initialized");
    Ok(())
  }

  async fn close(&self) -> Result<(), StoreError> {
    let mut guard = self.lock()?;
    if let Some(conn) = guard.take() {
      conn.close().map_err(|(_, e)| StoreError::from(e))?;
    }
    Ok(())
  }

  async fn replace_entries_cache(&self, entries: &[Entry]) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      tx.execute("DELETE FROM entries", [])?;
      {
        let mut stmt = tx.prepare("INSERT OR REPLACE INTO entries (id, data) VALUES (?, ?)")?;
        for entry in entries {
          let data = serde_json::to_vec(entry)?;
          stmt.execute(params![entry.id, data])?;
        }
      }
      tx.commit()?;
      Ok(())
    })?;

    debug!(count = entries.len(), "Replaced entries cache");
    Ok(())
  }

  async fn read_entries_cache(&self) -> Result<Vec<Entry>, StoreError> {
    self.with_conn(|conn| {
      let mut stmt = conn.prepare("SELECT data FROM entries ORDER BY id")?;
      let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

      let mut entries = Vec::new();
      for data in rows {
        entries.push(serde_json::from_slice(&data?)?);
      }
      Ok(entries)
    })
  }

  async fn enqueue_mutation(&self, mutation: &PendingMutation) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      let data = serde_json::to_vec(&mutation.payload)?;
      conn.execute(
        "INSERT OR REPLACE INTO mutations (id, kind, data, timestamp) VALUES (?, ?, ?, ?)",
        params![mutation.id, mutation.kind(), data, mutation.timestamp],
      )?;
      Ok(())
    })
  }

  async fn list_mutations(&self) -> Result<Vec<PendingMutation>, StoreError> {
    self.with_conn(|conn| {
      let mut stmt =
        conn.prepare("SELECT id, kind, data, timestamp FROM mutations ORDER BY timestamp, rowid")?;
      let rows = stmt.query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Vec<u8>>(2)?,
          row.get::<_, i64>(3)?,
        ))
      })?;

      let mut mutations = Vec::new();
      for row in rows {
        let (id, kind, data, timestamp) = row?;
        let payload: MutationPayload = serde_json::from_slice(&data)?;
        if payload.kind() != kind {
          return Err(StoreError::Corrupt(format!(
            "Mutation {} is stored as '{}' but carries a '{}' payload",
            id,
            kind,
            payload.kind()
          )));
        }
        mutations.push(PendingMutation {
          id,
          payload,
          timestamp,
        });
      }
      Ok(mutations)
    })
  }

  async fn remove_mutation(&self, id: &str) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn.execute("DELETE FROM mutations WHERE id = ?", params![id])?;
      Ok(())
    })
  }

  async fn clear_mutations(&self) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn.execute("DELETE FROM mutations", [])?;
      Ok(())
    })
  }
}
