//! Online/offline signal.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle to the current connectivity state.
///
/// Whatever knows about the network (a platform callback, a probe, a test)
/// calls `set_online`; interested tasks `subscribe` and are woken on changes.
///
/// Subscribers only see the latest state. A flap such as offline, online,
/// offline that happens before a subscriber wakes up reaches it as a single
/// change to offline, so the brief online window starts no sync pass. Writes
/// queued meanwhile stay queued until the next observed transition to online.
#[derive(Clone, Debug)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current state. Subscribers are only woken when it changes.
  ///
  /// Returns whether the state changed.
  pub fn set_online(&self, online: bool) -> bool {
    self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    })
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}
