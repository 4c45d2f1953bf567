//! The current network snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use signalbox_core::{Result, network::NetworkSnapshot};

/// Holds the latest snapshot delivered by the feed.
///
/// Readers get an `Arc` to a complete snapshot and never observe a partial
/// replacement.
#[derive(Debug)]
pub struct MovementStore {
  current: RwLock<Arc<NetworkSnapshot>>,
}

impl Default for MovementStore {
  fn default() -> Self { Self::new(NetworkSnapshot::empty(Utc::now())) }
}

impl MovementStore {
  pub fn new(initial: NetworkSnapshot) -> Self {
    Self { current: RwLock::new(Arc::new(initial)) }
  }

  pub fn snapshot(&self) -> Arc<NetworkSnapshot> {
    self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Validate `next` and make it current. On error the previous snapshot
  /// stays in place.
  pub fn replace(&self, next: NetworkSnapshot) -> Result<Arc<NetworkSnapshot>> {
    next.validate()?;
    let next = Arc::new(next);
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
    Ok(next)
  }
}
