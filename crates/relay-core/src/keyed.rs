//! Per-key async mutual exclusion
//!
//! Hands out one async mutex per key (account name or authorization state).
//! Entries nobody holds or waits on are pruned on the next acquisition, so
//! the map only grows with the number of keys in use at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct KeyedLocks {
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
            guards.retain(|k, slot| k == key || Arc::strong_count(slot) > 1);
            guards.entry(key.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Keys currently tracked (held, awaited, or not yet pruned).
    pub fn len(&self) -> usize {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
