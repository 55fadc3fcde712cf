//! Replays the pending-mutation queue against the remote authority and
//! refreshes the entries cache.
//!
//! One pass:
//! 1. List the queue and sort it by timestamp
//! 2. Send each mutation in order; every mutation leaves the queue whether
//!    the remote call succeeded or not
//! 3. Fetch the authoritative list and replace the cache with it
//!
//! A failed remote call for one mutation is logged and the pass moves on.
//! A failure anywhere else stops the pass and leaves the engine in
//! `SyncStatus::Error`.

mod engine;
mod status;

pub use engine::SyncEngine;
pub use status::{SyncOutcome, SyncReport, SyncStatus};
