//! Shared cache store abstraction
//!
//! The engine treats the cache as an external key/value store with
//! time-to-live support. A deployment typically points this at a
//! memcached-style service shared by every process;
//! [`MemoryStore`](crate::memory::MemoryStore) is the in-process reference
//! backend.

use memoir_core::MemoirResult;
use std::time::Duration;

/// Shared key/value store behind the cache and the dependency index.
///
/// # Contract
///
/// - `get` returns only live values: an entry past its TTL reads as absent.
/// - `set` replaces unconditionally; `ttl` of `None` stores without
///   time-based expiry.
/// - `delete` is idempotent and reports whether a live value existed.
/// - `add` is atomic set-if-absent: when several callers race on an absent
///   (or expired) key, exactly one succeeds. This is the primitive the
///   index lock is built on, so its atomicity is load-bearing.
///
/// Implementations are shared across threads and must not block on their
/// own interior locking for unbounded time. Failures surface as
/// [`StoreError::Backend`](memoir_core::StoreError::Backend).
pub trait CacheStore: Send + Sync {
    /// Fetch the value stored under `key`, if present and unexpired.
    fn get(&self, key: &str) -> MemoirResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any existing value.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<()>;

    /// Delete the value under `key`. Returns `true` if a live value existed.
    fn delete(&self, key: &str) -> MemoirResult<bool>;

    /// Atomic set-if-absent. Returns `true` when this call stored the value.
    fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<bool>;
}

/// Counters describing one store's traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Number of `get` calls that returned a live value.
    pub hits: u64,
    /// Number of `get` calls that returned nothing.
    pub misses: u64,
    /// Number of entries dropped because their TTL had passed.
    pub expirations: u64,
    /// Number of entries currently held, expired stragglers included.
    pub entry_count: u64,
}

impl StoreStats {
    /// Hit rate over all `get` traffic (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stats_hit_rate() {
        let stats = StoreStats {
            hits: 30,
            misses: 10,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);

        let empty = StoreStats::default();
        assert!((empty.hit_rate() - 0.0).abs() < 0.001);
    }
}
