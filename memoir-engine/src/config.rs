//! Engine configuration

use memoir_core::CacheKey;
use std::time::Duration;

/// Tunables for the cache engine.
///
/// The namespace prefixes every storage key the engine writes, so several
/// engines can share one store without colliding. The lock settings govern
/// the index lease: how long a holder may keep it, how many acquisition
/// attempts a mutation makes, and the base delay between attempts (the
/// delay grows linearly with the attempt number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Key namespace for entries, the index table, and the index lock.
    pub namespace: String,
    /// Lease duration for the index lock.
    pub lock_ttl: Duration,
    /// Acquisition attempts per index mutation before giving up.
    pub lock_attempts: u32,
    /// Base backoff between acquisition attempts.
    pub lock_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "memoir".to_string(),
            lock_ttl: Duration::from_secs(5),
            lock_attempts: 5,
            lock_backoff: Duration::from_millis(20),
        }
    }
}

impl EngineConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the index lock lease duration.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the number of lock acquisition attempts per index mutation.
    pub fn with_lock_attempts(mut self, attempts: u32) -> Self {
        self.lock_attempts = attempts;
        self
    }

    /// Set the base backoff between lock acquisition attempts.
    pub fn with_lock_backoff(mut self, backoff: Duration) -> Self {
        self.lock_backoff = backoff;
        self
    }

    /// Storage key for one cache entry.
    pub fn entry_key(&self, key: &CacheKey) -> String {
        format!("{}:e:{}", self.namespace, key)
    }

    /// Storage key for the dependency index table.
    pub fn index_key(&self) -> String {
        format!("{}:index", self.namespace)
    }

    /// Storage key for the index lock lease.
    pub fn lock_key(&self) -> String {
        format!("{}:index:lock", self.namespace)
    }
}

// ============================================================================
// TESTS
// ============================================================================
