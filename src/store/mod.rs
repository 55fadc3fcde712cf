//! Durable local storage for the entries cache and the pending-mutation queue.
//!
//! - `SqliteStore` persists both collections in one SQLite database and is
//!   the store used in normal sessions
//! - `MemoryStore` keeps them in process memory, for sessions where the
//!   database cannot be opened

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::LocalStore;
