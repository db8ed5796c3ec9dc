//! In-process reference store with lazy TTL expiry

use crate::traits::{CacheStore, StoreStats};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use memoir_core::MemoirResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One stored record with its optional expiry instant.
#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    fn new(bytes: &[u8], ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at = ttl.map(|ttl| {
            now + chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::milliseconds(ttl.as_millis() as i64))
        });
        Self {
            bytes: bytes.to_vec(),
            expires_at,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory store on a sharded concurrent map.
///
/// Expiry is lazy: an entry past its TTL reads as absent and is removed on
/// contact; [`purge_expired`](MemoryStore::purge_expired) sweeps the rest.
/// `add` resolves through the map's entry API, which locks the shard and
/// gives the set-if-absent atomicity the store contract requires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired stragglers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Sweep entries past their TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let dropped = before.saturating_sub(self.entries.len());
        self.expirations.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    /// Traffic counters. Approximate under concurrency.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> MemoirResult<Option<Vec<u8>>> {
        let now = Utc::now();
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.bytes.clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<()> {
        let entry = StoredEntry::new(value, ttl, Utc::now());
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> MemoirResult<bool> {
        let now = Utc::now();
        match self.entries.remove(key) {
            Some((_, entry)) if entry.is_expired(now) => {
                // Removed a corpse; report absent, as get would have.
                self.expirations.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> MemoirResult<bool> {
        let now = Utc::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired(now) => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                occupied.insert(StoredEntry::new(value, ttl, now));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, ttl, now));
                Ok(true)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
