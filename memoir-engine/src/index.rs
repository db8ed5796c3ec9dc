//! Shared dependency index
//!
//! One logical table in the shared store, mapping each encoded descriptor
//! to the cache keys whose entries depend on it. Reads of the table are a
//! single atomic fetch; every mutation is a read-modify-write cycle under a
//! TTL lease, so concurrent processes never interleave updates and a dead
//! holder's lease expires on its own.

use crate::config::EngineConfig;
use memoir_core::{
    CacheKey, DependencyOp, DependencySet, Descriptor, EntityKind, IndexError, MemoirError,
    MemoirResult,
};
use memoir_store::{CacheStore, LockGuard, TtlLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The index table's wire form: encoded descriptor to registered cache keys.
///
/// Rows and key sets are both ordered, so the serialized table is
/// deterministic and table equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexTable {
    rows: BTreeMap<String, BTreeSet<CacheKey>>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of descriptor rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cache keys registered under one descriptor.
    pub fn keys_for(&self, descriptor: &Descriptor) -> Option<&BTreeSet<CacheKey>> {
        self.rows.get(&descriptor.encode())
    }

    /// Every decodable descriptor with a row in the table.
    pub fn descriptors(&self) -> impl Iterator<Item = Descriptor> + '_ {
        self.rows.keys().filter_map(|encoded| Descriptor::decode(encoded))
    }

    /// Register a cache key under a descriptor.
    pub fn insert(&mut self, descriptor: &Descriptor, key: CacheKey) {
        self.rows.entry(descriptor.encode()).or_default().insert(key);
    }

    /// Remove a cache key from every row, dropping rows left empty.
    pub fn remove_key_everywhere(&mut self, key: &CacheKey) {
        self.rows.retain(|_, keys| {
            keys.remove(key);
            !keys.is_empty()
        });
    }

    /// Remove one descriptor's row and return the keys it held.
    pub fn take_row(&mut self, descriptor: &Descriptor) -> BTreeSet<CacheKey> {
        self.rows.remove(&descriptor.encode()).unwrap_or_default()
    }

    /// Predicate descriptors of `kind` that could observe a change to the
    /// named attributes.
    ///
    /// Matching is conservative: a row matches when its predicate names at
    /// least one changed attribute, and a row whose predicate cannot be
    /// parsed back always matches. Evicting too much costs a recomputation;
    /// evicting too little serves stale data.
    ///
    /// Empty-predicate rows are collection-membership dependencies. They
    /// are included only when `include_empty` is set, which the write path
    /// does for creates and deletes; value updates cannot move membership
    /// of an unconstrained collection.
    pub fn matching_predicates(
        &self,
        kind: &EntityKind,
        changed: &BTreeSet<String>,
        include_empty: bool,
    ) -> Vec<Descriptor> {
        self.descriptors()
            .filter(|d| d.entity() == kind)
            .filter(|d| {
                matches!(d.op(), DependencyOp::Filter | DependencyOp::Exclude)
            })
            .filter(|d| match d.predicate() {
                Some(p) if p.is_empty() => include_empty,
                Some(p) => p.touches(changed),
                None => true,
            })
            .collect()
    }
}

/// Handle to the shared index: the table plus the lease that serializes
/// writers to it.
///
/// # Design
///
/// The table is stored as one value and always rewritten whole. That keeps
/// the store contract minimal (get, set, delete, add) at the cost of
/// coarse-grained locking, which is the right trade while entries are
/// evicted in small batches. Registration degrades instead of failing: if
/// the lease cannot be had after the configured attempts, or the backend
/// fails mid-update, the entry stays cached and valid but is never indexed,
/// so it can only die by TTL or explicit eviction. Invalidation makes no
/// such concession and reports contention to its caller.
pub struct DependencyIndex<S: CacheStore> {
    store: Arc<S>,
    lock: TtlLock<S>,
    config: EngineConfig,
}

impl<S: CacheStore> DependencyIndex<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let lock = TtlLock::new(Arc::clone(&store), config.lock_key(), config.lock_ttl);
        Self { store, lock, config }
    }

    /// One non-blocking attempt on the index lease.
    pub fn acquire_lock(&self) -> MemoirResult<bool> {
        self.lock.try_acquire()
    }

    /// Unconditional lease release.
    pub fn release_lock(&self) -> MemoirResult<()> {
        self.lock.release()
    }

    /// Fetch the current table without taking the lease.
    ///
    /// Writers replace the table atomically, so a reader sees a complete
    /// table from some recent moment. A missing table reads as empty; bytes
    /// that do not parse are corruption and surface as an error rather than
    /// an empty table, because treating them as empty would silently orphan
    /// every registered entry.
    pub fn read_table(&self) -> MemoirResult<IndexTable> {
        match self.store.get(&self.config.index_key())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|error| {
                IndexError::Corrupt {
                    reason: error.to_string(),
                }
                .into()
            }),
            None => Ok(IndexTable::new()),
        }
    }

    /// Persist a table, replacing the stored one. The index itself never
    /// expires; rows leave it through eviction.
    pub fn write_table(&self, table: &IndexTable) -> MemoirResult<()> {
        let bytes = serde_json::to_vec(table).map_err(|error| IndexError::Corrupt {
            reason: error.to_string(),
        })?;
        self.store.set(&self.config.index_key(), &bytes, None)?;
        Ok(())
    }

    /// Register a cache key under every descriptor in a dependency set.
    ///
    /// Returns whether the mapping was recorded. Registration sits on the
    /// read path, so it degrades rather than fails: the cached value is
    /// already stored and correct, it just stays unreachable for
    /// descriptor-based invalidation. That holds for lease contention and
    /// for a backend that errors while the table is being updated.
    pub fn record(&self, key: CacheKey, deps: &DependencySet) -> MemoirResult<bool> {
        if deps.is_empty() {
            return Ok(false);
        }
        let outcome = self.with_table(|table| {
            for descriptor in deps {
                table.insert(descriptor, key);
            }
            Ok(())
        });
        match outcome {
            Ok(()) => Ok(true),
            Err(MemoirError::Index(IndexError::LockContended { attempts })) => {
                tracing::warn!(
                    %key,
                    attempts,
                    "index lease contended; entry degrades to TTL-only eviction"
                );
                Ok(false)
            }
            Err(error) => {
                tracing::warn!(
                    %key,
                    %error,
                    "index update failed; entry degrades to TTL-only eviction"
                );
                Ok(false)
            }
        }
    }

    /// Strip one cache key from every row it appears in.
    pub fn remove_cache_key(&self, key: &CacheKey) -> MemoirResult<()> {
        self.with_table(|table| {
            table.remove_key_everywhere(key);
            Ok(())
        })
    }

    /// Evict every entry registered under one descriptor.
    ///
    /// Returns the number of distinct cache entries evicted.
    pub fn invalidate(&self, descriptor: &Descriptor) -> MemoirResult<usize> {
        self.with_table(|table| {
            self.evict_targets(table, std::slice::from_ref(descriptor))
        })
    }

    /// Evict everything that depended on one entity's identity.
    pub fn invalidate_identity(
        &self,
        kind: &EntityKind,
        identity: &Value,
    ) -> MemoirResult<usize> {
        self.invalidate(&Descriptor::identification(kind.clone(), identity))
    }

    /// Evict every collection read of `kind` whose predicate names one of
    /// the changed attributes.
    ///
    /// Empty-predicate rows are left alone here; they react to membership
    /// changes, which flow through [`invalidate_for_write`](Self::invalidate_for_write).
    pub fn invalidate_filters(
        &self,
        kind: &EntityKind,
        changed: &BTreeSet<String>,
    ) -> MemoirResult<usize> {
        self.with_table(|table| {
            let targets = table.matching_predicates(kind, changed, false);
            self.evict_targets(table, &targets)
        })
    }

    /// One locked pass covering a committed write: the entity's
    /// identification descriptor, every predicate row naming a changed
    /// attribute, and, when the write created or deleted the entity
    /// (`membership_changed`), every empty-predicate row of the kind.
    pub fn invalidate_for_write(
        &self,
        kind: &EntityKind,
        identity: &Value,
        changed: &BTreeSet<String>,
        membership_changed: bool,
    ) -> MemoirResult<usize> {
        self.with_table(|table| {
            let mut targets = table.matching_predicates(kind, changed, membership_changed);
            targets.push(Descriptor::identification(kind.clone(), identity));
            self.evict_targets(table, &targets)
        })
    }

    /// Delete the entries behind the target rows and scrub their keys from
    /// the whole table. Runs inside a `with_table` cycle.
    ///
    /// Scrubbing matters: an evicted key left in an unrelated row would be
    /// "re-evicted" later and distort that row's eviction count, and the
    /// table would accrete keys with no backing entry.
    fn evict_targets(
        &self,
        table: &mut IndexTable,
        targets: &[Descriptor],
    ) -> MemoirResult<usize> {
        let mut victims: BTreeSet<CacheKey> = BTreeSet::new();
        for target in targets {
            victims.extend(table.take_row(target));
        }
        for key in &victims {
            self.store.delete(&self.config.entry_key(key))?;
            table.remove_key_everywhere(key);
        }
        Ok(victims.len())
    }

    /// Run one read-modify-write cycle on the table under the lease.
    fn with_table<T>(
        &self,
        apply: impl FnOnce(&mut IndexTable) -> MemoirResult<T>,
    ) -> MemoirResult<T> {
        let guard = self.acquire_with_retries()?;
        let mut table = self.read_table()?;
        let outcome = apply(&mut table)?;
        self.write_table(&table)?;
        drop(guard);
        Ok(outcome)
    }

    /// Take the lease, retrying with linearly growing backoff.
    fn acquire_with_retries(&self) -> MemoirResult<LockGuard<'_, S>> {
        let attempts = self.config.lock_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(guard) = self.lock.guard()? {
                return Ok(guard);
            }
            if attempt < attempts {
                std::thread::sleep(self.config.lock_backoff * attempt);
            }
        }
        Err(IndexError::LockContended { attempts }.into())
    }
}

// ============================================================================
// TESTS
// ============================================================================
