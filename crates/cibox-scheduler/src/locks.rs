//! Keyed async locks.

use cibox_core::ResourceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per id, created on first use.
///
/// Entries nobody holds are dropped the next time a lock is looked up.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<ResourceId, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: ResourceId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|key, lock| *key == id || Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    /// Wait until the lock for `id` is free.
    pub async fn acquire(&self, id: ResourceId) -> OwnedMutexGuard<()> {
        self.entry(id).lock_owned().await
    }

    /// Take the lock for `id` only if nobody holds it.
    pub fn try_acquire(&self, id: ResourceId) -> Option<OwnedMutexGuard<()>> {
        self.entry(id).try_lock_owned().ok()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
