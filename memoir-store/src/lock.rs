//! TTL lease lock built on the store's set-if-absent primitive

use crate::traits::CacheStore;
use memoir_core::MemoirResult;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Mutual-exclusion lease stored beside the data it guards.
///
/// # Design
///
/// Acquisition is a single atomic set-if-absent with a TTL, so at most one
/// holder exists until the token is deleted or ages out. There is no
/// blocking and no fairness; callers retry on their own schedule. A holder
/// that crashes simply stops existing and the token expires, which bounds
/// how long the guarded structure can stay unreachable.
///
/// The token value is a fresh UUIDv7 per acquisition. Release does not
/// check it, but it gives operators a breadcrumb when inspecting a stuck
/// lease.
pub struct TtlLock<S> {
    store: Arc<S>,
    key: String,
    ttl: Duration,
}

impl<S: CacheStore> TtlLock<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// One non-blocking acquisition attempt.
    pub fn try_acquire(&self) -> MemoirResult<bool> {
        let token = Uuid::now_v7();
        self.store
            .add(&self.key, token.as_bytes(), Some(self.ttl))
    }

    /// Unconditional release. Idempotent; safe to call without holding.
    pub fn release(&self) -> MemoirResult<()> {
        self.store.delete(&self.key)?;
        Ok(())
    }

    /// Acquire and wrap the lease in a guard that releases on drop.
    ///
    /// Returns `Ok(None)` when another holder has the lease.
    pub fn guard(&self) -> MemoirResult<Option<LockGuard<'_, S>>> {
        if self.try_acquire()? {
            Ok(Some(LockGuard { lock: self }))
        } else {
            Ok(None)
        }
    }
}

/// RAII lease holder; releases on drop, unwinding included.
pub struct LockGuard<'a, S: CacheStore> {
    lock: &'a TtlLock<S>,
}

impl<S: CacheStore> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        // A failed release leaves the token to age out via its TTL.
        if let Err(error) = self.lock.release() {
            tracing::warn!(key = %self.lock.key, %error, "lock release failed; lease expires by TTL");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::thread;

    fn make_lock(ttl: Duration) -> TtlLock<MemoryStore> {
        TtlLock::new(Arc::new(MemoryStore::new()), "test:lock", ttl)
    }

    #[test]
    fn test_second_acquire_fails_until_ttl_passes() {
        let lock = make_lock(Duration::from_millis(100));

        assert!(lock.try_acquire().expect("first acquire"));
        assert!(!lock.try_acquire().expect("second acquire"));

        thread::sleep(Duration::from_millis(150));
        assert!(lock.try_acquire().expect("acquire after expiry"));
    }

    #[test]
    fn test_release_makes_lease_available_immediately() {
        let lock = make_lock(Duration::from_secs(30));

        assert!(lock.try_acquire().expect("acquire"));
        lock.release().expect("release");
        assert!(lock.try_acquire().expect("reacquire"));
    }

    #[test]
    fn test_release_without_holding_is_a_no_op() {
        let lock = make_lock(Duration::from_secs(30));
        lock.release().expect("release of unheld lease");
        assert!(lock.try_acquire().expect("acquire"));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = make_lock(Duration::from_secs(30));

        {
            let guard = lock.guard().expect("guard");
            assert!(guard.is_some());
            assert!(lock.guard().expect("contended guard").is_none());
        }

        assert!(lock.guard().expect("guard after drop").is_some());
    }

    #[test]
    fn test_concurrent_acquisition_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                TtlLock::new(store, "contended:lock", Duration::from_secs(30))
                    .try_acquire()
                    .expect("acquire")
            }));
        }
        let wins = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_locks_on_different_keys_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let a = TtlLock::new(Arc::clone(&store), "lock:a", Duration::from_secs(30));
        let b = TtlLock::new(store, "lock:b", Duration::from_secs(30));

        assert!(a.try_acquire().expect("acquire a"));
        assert!(b.try_acquire().expect("acquire b"));
    }
}
