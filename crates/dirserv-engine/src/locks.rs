//! Per-DN entry lock manager.
//!
//! The sole arbiter of entry-level concurrency. Acquisition waits a
//! bounded time and then fails with [`LockError::Busy`]; it never blocks
//! indefinitely, keeping operation latency predictable. Multiple read
//! locks on one DN are compatible; a held read lock makes a write
//! acquisition fail within the bound.

use dirserv_core::Dn;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

/// Lock acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock could not be acquired within the bounded wait.
    #[error("entry lock busy")]
    Busy,
}

/// Guard for a held read lock; the lock releases on drop.
#[derive(Debug)]
pub struct ReadLockGuard {
    _guard: OwnedRwLockReadGuard<()>,
}

/// Guard for a held write lock; the lock releases on drop.
#[derive(Debug)]
pub struct WriteLockGuard {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Registry of per-DN read/write locks.
#[derive(Debug)]
pub struct EntryLockManager {
    slots: Mutex<HashMap<Dn, Arc<RwLock<()>>>>,
    timeout: Duration,
}

impl EntryLockManager {
    /// Create a manager with the given bounded acquisition wait.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire a read lock on `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] when a writer holds the lock past the
    /// bounded wait.
    pub async fn lock_read(&self, dn: &Dn) -> Result<ReadLockGuard, LockError> {
        let slot = self.slot(dn).await;
        match tokio::time::timeout(self.timeout, slot.read_owned()).await {
            Ok(guard) => Ok(ReadLockGuard { _guard: guard }),
            Err(_) => {
                trace!(dn = %dn, "read lock busy");
                Err(LockError::Busy)
            }
        }
    }

    /// Acquire a write lock on `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] when any holder keeps the lock past the
    /// bounded wait.
    pub async fn lock_write(&self, dn: &Dn) -> Result<WriteLockGuard, LockError> {
        let slot = self.slot(dn).await;
        match tokio::time::timeout(self.timeout, slot.write_owned()).await {
            Ok(guard) => Ok(WriteLockGuard { _guard: guard }),
            Err(_) => {
                trace!(dn = %dn, "write lock busy");
                Err(LockError::Busy)
            }
        }
    }

    /// Number of live lock slots (for observability).
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn slot(&self, dn: &Dn) -> Arc<RwLock<()>> {
        let mut slots = self.slots.lock().await;
        // Drop slots nobody holds; the map entry is the only reference.
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        slots
            .entry(dn.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EntryLockManager {
        EntryLockManager::new(Duration::from_millis(20))
    }

    fn dn(text: &str) -> Dn {
        Dn::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_read_locks_are_compatible() {
        let locks = manager();
        let target = dn("o=test");
        let _first = locks.lock_read(&target).await.unwrap();
        let _second = locks.lock_read(&target).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_blocked_by_reader_is_busy() {
        let locks = manager();
        let target = dn("o=test");
        let _reader = locks.lock_read(&target).await.unwrap();
        assert_eq!(
            locks.lock_write(&target).await.unwrap_err(),
            LockError::Busy
        );
    }

    #[tokio::test]
    async fn test_read_blocked_by_writer_is_busy() {
        let locks = manager();
        let target = dn("o=test");
        let _writer = locks.lock_write(&target).await.unwrap();
        assert_eq!(locks.lock_read(&target).await.unwrap_err(), LockError::Busy);
    }

    #[tokio::test]
    async fn test_different_dns_do_not_contend() {
        let locks = manager();
        let _writer = locks.lock_write(&dn("o=one")).await.unwrap();
        let _other = locks.lock_write(&dn("o=two")).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = manager();
        let target = dn("o=test");
        {
            let _writer = locks.lock_write(&target).await.unwrap();
        }
        let _again = locks.lock_write(&target).await.unwrap();
    }

    #[tokio::test]
    async fn test_unused_slots_are_pruned() {
        let locks = manager();
        {
            let _guard = locks.lock_write(&dn("o=gone")).await.unwrap();
        }
        let _live = locks.lock_read(&dn("o=live")).await.unwrap();
        assert_eq!(locks.slot_count().await, 1);
    }
}
