//! Memoizing call wrapper
//!
//! The engine ties the pieces together: derive the key for a bound call,
//! serve hits with their stored dependencies replayed, and on a miss run
//! the computation inside a tracking scope, persist the result next to
//! everything it depended on, and register that mapping in the shared
//! index.

use crate::collector;
use crate::config::EngineConfig;
use crate::index::DependencyIndex;
use crate::tracker::{self, TrackingScope};
use memoir_core::{BoundCall, CacheError, DependencySet, MemoirResult};
use memoir_store::CacheStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One stored record: the value plus the dependency set that produced it.
///
/// Value and dependencies live in a single record with a single expiry, so
/// they can never drift apart. A record that fails to parse, or parses
/// without its dependency set, reads as a miss: replaying unknown
/// provenance into an enclosing scope would corrupt the enclosing entry.
#[derive(Debug, Serialize, Deserialize)]
struct CachedEntry {
    value: serde_json::Value,
    deps: DependencySet,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time snapshot of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl EngineStats {
    /// Hit rate as a fraction, 0.0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Dependency-tracked memoization over one shared store.
///
/// # Design
///
/// All engine calls are synchronous. Dependency frames live in thread-local
/// storage and follow the call stack, which only holds if a memoized
/// computation runs start to finish on the thread that opened its scope.
/// The store behind the engine is shared freely across threads and
/// processes; the tracking state never is.
pub struct CacheEngine<S: CacheStore> {
    store: Arc<S>,
    index: DependencyIndex<S>,
    config: EngineConfig,
    counters: Counters,
}

impl<S: CacheStore> CacheEngine<S> {
    /// Engine with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        let index = DependencyIndex::new(Arc::clone(&store), config.clone());
        Self {
            store,
            index,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The dependency index this engine records into.
    pub fn index(&self) -> &DependencyIndex<S> {
        &self.index
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Memoize one call until its dependencies change.
    ///
    /// On a hit the stored value is returned and its dependency set is
    /// replayed into every open tracking scope, exactly as if the
    /// computation had run. On a miss `compute` runs inside a fresh scope;
    /// its result is stored together with everything it tracked plus the
    /// dependencies implied by the call's own arguments, and the mapping is
    /// registered in the index so writes can find it.
    ///
    /// An `Err` from `compute` propagates unchanged and caches nothing.
    pub fn cached<R, F>(&self, call: &BoundCall, compute: F) -> MemoirResult<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> MemoirResult<R>,
    {
        self.cached_with_ttl(call, None, compute)
    }

    /// Memoize one call for a fixed duration.
    ///
    /// The entry expires by time alone and is never registered in the
    /// index, so writes do not evict it. For results that must react to
    /// writes, use [`cached`](Self::cached).
    pub fn cached_for<R, F>(&self, call: &BoundCall, ttl: Duration, compute: F) -> MemoirResult<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> MemoirResult<R>,
    {
        self.cached_with_ttl(call, Some(ttl), compute)
    }

    /// Drop one memoized call's entry, wherever it is referenced.
    ///
    /// This is the escape hatch for entries with no TTL and no tracked
    /// dependencies, which no write will ever evict. Returns whether a live
    /// entry existed.
    pub fn evict(&self, call: &BoundCall) -> MemoirResult<bool> {
        let key = call.cache_key();
        let existed = self.store.delete(&self.config.entry_key(&key))?;
        self.index.remove_cache_key(&key)?;
        if existed {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(existed)
    }

    fn cached_with_ttl<R, F>(
        &self,
        call: &BoundCall,
        ttl: Option<Duration>,
        compute: F,
    ) -> MemoirResult<R>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> MemoirResult<R>,
    {
        let key = call.cache_key();
        let entry_key = self.config.entry_key(&key);

        if let Some(entry) = self.load_entry(&entry_key)? {
            match serde_json::from_value::<R>(entry.value) {
                Ok(value) => {
                    tracker::replay(&entry.deps);
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(call = %call.site(), %key, "cache hit");
                    return Ok(value);
                }
                Err(error) => {
                    tracing::debug!(
                        call = %call.site(),
                        %key,
                        %error,
                        "cached value failed to decode, recomputing"
                    );
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(call = %call.site(), %key, "cache miss");

        let scope = TrackingScope::enter();
        let value = compute()?;
        let mut deps = scope.finish();
        collector::collect_call(call.args(), &mut deps);
        tracker::replay(&deps);

        let entry = CachedEntry {
            value: serde_json::to_value(&value).map_err(|error| CacheError::Codec {
                key: key.to_hex(),
                reason: error.to_string(),
            })?,
            deps,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|error| CacheError::Codec {
            key: key.to_hex(),
            reason: error.to_string(),
        })?;
        self.store.set(&entry_key, &bytes, ttl)?;

        if ttl.is_none() {
            self.index.record(key, &entry.deps)?;
        }

        Ok(value)
    }

    /// Fetch and parse one entry. Unparseable bytes read as a miss.
    fn load_entry(&self, entry_key: &str) -> MemoirResult<Option<CachedEntry>> {
        let bytes = match self.store.get(entry_key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                tracing::debug!(key = entry_key, %error, "corrupt cache entry, treating as miss");
                Ok(None)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::scope_depth;
    use memoir_core::{CallSite, Descriptor, EntityKind, EntityRef, MemoirError, StoreError, TrackValue};
    use memoir_store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn make_engine() -> CacheEngine<MemoryStore> {
        CacheEngine::new(Arc::new(MemoryStore::new()))
    }

    fn square_call(n: i64) -> BoundCall {
        CallSite::new("math::square").bind().arg(&n)
    }

    fn user(id: i64) -> EntityRef {
        EntityRef::new(EntityKind::new("user"), json!(id))
    }

    fn user_id(id: i64) -> Descriptor {
        user(id).identification()
    }

    #[test]
    fn test_miss_computes_then_hit_reuses() {
        let engine = make_engine();
        let executions = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: i64 = engine
                .cached(&square_call(4), || {
                    executions.fetch_add(1, Ordering::Relaxed);
                    Ok(16)
                })
                .unwrap();
            assert_eq!(value, 16);
        }

        assert_eq!(executions.load(Ordering::Relaxed), 1);
        let stats = engine.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn test_different_args_cache_separately() {
        let engine = make_engine();

        let four: i64 = engine.cached(&square_call(4), || Ok(16)).unwrap();
        let five: i64 = engine.cached(&square_call(5), || Ok(25)).unwrap();

        assert_eq!(four, 16);
        assert_eq!(five, 25);
        assert_eq!(engine.stats().misses, 2);
    }

    #[test]
    fn test_miss_records_tracked_dependencies() {
        let engine = make_engine();

        let _: String = engine
            .cached(&CallSite::new("users::email").bind().arg(&7i64), || {
                tracker::track(user_id(7));
                Ok("a@b.c".to_string())
            })
            .unwrap();

        let table = engine.index().read_table().unwrap();
        assert!(table.keys_for(&user_id(7)).is_some());
    }

    #[test]
    fn test_argument_dependencies_are_recorded_without_tracking() {
        let engine = make_engine();
        let call = CallSite::new("users::badge")
            .bind()
            .arg_value(TrackValue::Entity(user(3)));

        let _: String = engine.cached(&call, || Ok("gold".to_string())).unwrap();

        let table = engine.index().read_table().unwrap();
        assert!(table.keys_for(&user_id(3)).is_some());
    }

    #[test]
    fn test_hit_replays_dependencies_into_open_scope() {
        let engine = make_engine();
        let call = CallSite::new("users::email").bind().arg(&7i64);

        // Warm the entry; its stored set carries the tracked descriptor.
        let _: i64 = engine
            .cached(&call, || {
                tracker::track(user_id(7));
                Ok(1)
            })
            .unwrap();

        let scope = TrackingScope::enter();
        let _: i64 = engine.cached(&call, || Ok(99)).unwrap();
        let deps = scope.finish();

        assert_eq!(engine.stats().hits, 1);
        assert!(deps.contains(&user_id(7)));
    }

    #[test]
    fn test_miss_propagates_dependencies_into_open_scope() {
        let engine = make_engine();
        let call = CallSite::new("users::badge")
            .bind()
            .arg_value(TrackValue::Entity(user(3)));

        let scope = TrackingScope::enter();
        let _: String = engine.cached(&call, || Ok("gold".to_string())).unwrap();
        let deps = scope.finish();

        assert!(deps.contains(&user_id(3)));
    }

    #[test]
    fn test_compute_error_propagates_and_caches_nothing() {
        let engine = make_engine();
        let executions = AtomicUsize::new(0);

        let attempt = |expected: i64| -> MemoirResult<i64> {
            engine.cached(&square_call(9), || {
                executions.fetch_add(1, Ordering::Relaxed);
                if executions.load(Ordering::Relaxed) == 1 {
                    Err(CacheError::ComputeFailed {
                        reason: "db down".to_string(),
                    }
                    .into())
                } else {
                    Ok(expected)
                }
            })
        };

        let first = attempt(81);
        assert!(matches!(
            first,
            Err(MemoirError::Cache(CacheError::ComputeFailed { .. }))
        ));
        assert_eq!(scope_depth(), 0);

        // Nothing was cached, so the retry computes again.
        assert_eq!(attempt(81).unwrap(), 81);
        assert_eq!(executions.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_ttl_entries_expire_and_skip_the_index() {
        let engine = make_engine();
        let executions = AtomicUsize::new(0);
        let mut compute = || {
            executions.fetch_add(1, Ordering::Relaxed);
            Ok(1i64)
        };

        let call = CallSite::new("reports::daily").bind().arg_value(TrackValue::Entity(user(1)));
        let _: i64 = engine
            .cached_for(&call, Duration::from_millis(40), &mut compute)
            .unwrap();

        // Dependencies were collected for propagation but never indexed.
        assert!(engine.index().read_table().unwrap().is_empty());

        std::thread::sleep(Duration::from_millis(60));
        let _: i64 = engine
            .cached_for(&call, Duration::from_millis(40), &mut compute)
            .unwrap();
        assert_eq!(executions.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_entries_without_dependencies_are_not_indexed() {
        let engine = make_engine();

        let _: i64 = engine.cached(&square_call(4), || Ok(16)).unwrap();

        assert!(engine.index().read_table().unwrap().is_empty());
    }

    #[test]
    fn test_evict_clears_entry_and_index_rows() {
        let engine = make_engine();
        let call = CallSite::new("users::badge")
            .bind()
            .arg_value(TrackValue::Entity(user(3)));
        let executions = AtomicUsize::new(0);
        let mut compute = || {
            executions.fetch_add(1, Ordering::Relaxed);
            Ok("gold".to_string())
        };

        let _: String = engine.cached(&call, &mut compute).unwrap();
        assert!(engine.evict(&call).unwrap());
        assert!(!engine.evict(&call).unwrap());
        assert!(engine.index().read_table().unwrap().is_empty());

        let _: String = engine.cached(&call, &mut compute).unwrap();
        assert_eq!(executions.load(Ordering::Relaxed), 2);
        assert_eq!(engine.stats().evictions, 1);
    }

    #[test]
    fn test_corrupt_entry_reads_as_miss_and_heals() {
        let engine = make_engine();
        let call = square_call(4);
        let entry_key = engine.config().entry_key(&call.cache_key());

        engine.store().set(&entry_key, b"garbage", None).unwrap();

        let value: i64 = engine.cached(&call, || Ok(16)).unwrap();
        assert_eq!(value, 16);
        assert_eq!(engine.stats().misses, 1);

        // The miss overwrote the garbage; the next call hits.
        let value: i64 = engine.cached(&call, || Ok(0)).unwrap();
        assert_eq!(value, 16);
        assert_eq!(engine.stats().hits, 1);
    }

    #[test]
    fn test_entry_without_dependency_field_reads_as_miss() {
        let engine = make_engine();
        let call = square_call(4);
        let entry_key = engine.config().entry_key(&call.cache_key());

        engine
            .store()
            .set(&entry_key, br#"{"value":16}"#, None)
            .unwrap();

        let value: i64 = engine.cached(&call, || Ok(32)).unwrap();
        assert_eq!(value, 32);
    }

    #[test]
    fn test_invalidation_forces_recomputation() {
        let engine = make_engine();
        let call = CallSite::new("users::badge")
            .bind()
            .arg_value(TrackValue::Entity(user(3)));
        let executions = AtomicUsize::new(0);
        let mut compute = || {
            executions.fetch_add(1, Ordering::Relaxed);
            Ok("gold".to_string())
        };

        let _: String = engine.cached(&call, &mut compute).unwrap();
        let evicted = engine
            .index()
            .invalidate_identity(&EntityKind::new("user"), &json!(3))
            .unwrap();
        assert_eq!(evicted, 1);

        let _: String = engine.cached(&call, &mut compute).unwrap();
        assert_eq!(executions.load(Ordering::Relaxed), 2);
    }

    /// Store whose index table is unreachable; everything else works.
    struct IndexlessStore {
        inner: MemoryStore,
    }

    impl CacheStore for IndexlessStore {
        fn get(&self, key: &str) -> MemoirResult<Option<Vec<u8>>> {
            if key.ends_with(":index") {
                return Err(StoreError::Backend {
                    op: "get",
                    key: key.to_string(),
                    reason: "backend saturated".to_string(),
                }
                .into());
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<()> {
            self.inner.set(key, value, ttl)
        }

        fn delete(&self, key: &str) -> MemoirResult<bool> {
            self.inner.delete(key)
        }

        fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<bool> {
            self.inner.add(key, value, ttl)
        }
    }

    #[test]
    fn test_read_survives_a_failing_index_backend() {
        let engine = CacheEngine::new(Arc::new(IndexlessStore {
            inner: MemoryStore::new(),
        }));
        let call = CallSite::new("users::email")
            .bind()
            .arg_value(TrackValue::Entity(user(7)));

        // The entry is stored before recording runs; a backend failure on
        // the index must not take the computed value away from the caller.
        let value: String = engine.cached(&call, || Ok("a@b.c".to_string())).unwrap();
        assert_eq!(value, "a@b.c");

        // The entry landed in the cache and serves hits as usual.
        let value: String = engine.cached(&call, || Ok("never-runs".to_string())).unwrap();
        assert_eq!(value, "a@b.c");
        assert_eq!(engine.stats().hits, 1);
    }

    #[test]
    fn test_degraded_record_still_serves_the_value() {
        let engine = CacheEngine::with_config(
            Arc::new(MemoryStore::new()),
            EngineConfig::new()
                .with_lock_attempts(2)
                .with_lock_backoff(Duration::from_millis(1)),
        );
        let call = CallSite::new("users::badge")
            .bind()
            .arg_value(TrackValue::Entity(user(3)));

        assert!(engine.index().acquire_lock().unwrap());
        let value: String = engine.cached(&call, || Ok("gold".to_string())).unwrap();
        assert_eq!(value, "gold");
        engine.index().release_lock().unwrap();

        // The value is cached but unreachable for invalidation.
        assert!(engine.index().read_table().unwrap().is_empty());
        let value: String = engine.cached(&call, || Ok("other".to_string())).unwrap();
        assert_eq!(value, "gold");
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = EngineStats {
            hits: 3,
            misses: 1,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(EngineStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_namespaces_isolate_engines() {
        let store = Arc::new(MemoryStore::new());
        let first = CacheEngine::with_config(
            Arc::clone(&store),
            EngineConfig::new().with_namespace("alpha"),
        );
        let second = CacheEngine::with_config(
            Arc::clone(&store),
            EngineConfig::new().with_namespace("beta"),
        );

        let a: i64 = first.cached(&square_call(4), || Ok(16)).unwrap();
        let b: i64 = second.cached(&square_call(4), || Ok(999)).unwrap();

        assert_eq!(a, 16);
        assert_eq!(b, 999);
    }
}
