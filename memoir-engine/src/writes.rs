//! Write-path invalidation
//!
//! Writers do not name cache entries; they describe the write and the
//! engine finds the entries through the index. The hook is two-phase
//! because the changed-attribute set needs both images of the entity: the
//! guard captures the pre-image before the write persists and diffs it
//! against the post-image once the write has committed.

use crate::memo::CacheEngine;
use memoir_core::{Descriptor, EntityKind, TrackValue, TrackedEntity};
use memoir_store::CacheStore;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The kind of entity mutation being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

/// Outcome of one write's invalidation pass.
#[derive(Debug, Clone)]
pub struct InvalidationReport {
    /// Distinct cache entries evicted.
    pub evicted: usize,
    /// False when the pass could not run; affected entries stay cached
    /// until their TTL or an explicit eviction.
    pub complete: bool,
    /// The written entity's identification descriptor, for callers that
    /// chain recomputation off the write.
    pub identification: Descriptor,
}

/// Two-phase invalidation hook around one entity write.
///
/// # Contract
///
/// Build the guard with [`CacheEngine::begin_write`] before persisting the
/// change, while the pre-image is still observable, and call
/// [`committed`](WriteGuard::committed) only after the write lands.
/// Dropping the guard without committing runs no invalidation at all,
/// which is correct for an abandoned write: persisted state did not
/// change, so every cached entry is still right.
#[must_use = "a write guard invalidates nothing until committed"]
pub struct WriteGuard<'e, S: CacheStore> {
    engine: &'e CacheEngine<S>,
    kind: EntityKind,
    identity: Value,
    write: WriteKind,
    before: BTreeMap<String, TrackValue>,
}

impl<S: CacheStore> CacheEngine<S> {
    /// Open the invalidation hook for one write.
    ///
    /// For updates and deletes, `entity` must carry the attribute values as
    /// they are persisted right now; the guard snapshots them as the
    /// pre-image. For creates there is no pre-image and every attribute of
    /// the committed entity counts as changed.
    pub fn begin_write<E: TrackedEntity>(&self, write: WriteKind, entity: &E) -> WriteGuard<'_, S> {
        let before = match write {
            WriteKind::Create => BTreeMap::new(),
            WriteKind::Update | WriteKind::Delete => entity.attributes(),
        };
        WriteGuard {
            engine: self,
            kind: E::entity_kind(),
            identity: entity.identity(),
            write,
            before,
        }
    }
}

impl<S: CacheStore> WriteGuard<'_, S> {
    pub fn write_kind(&self) -> WriteKind {
        self.write
    }

    pub fn entity_kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Complete the hook after the write has committed.
    ///
    /// Diffs the post-image against the captured pre-image and evicts what
    /// the change could affect: everything depending on the entity's
    /// identity, plus every collection read whose predicate touches a
    /// changed attribute. Creates and deletes also evict the
    /// empty-predicate rows of the kind, since membership of the
    /// unconstrained collection moved; deletes treat the post-image as
    /// empty, so every pre-image attribute counts as changed.
    ///
    /// The write is already durable when this runs, so failure here is
    /// reported in the returned [`InvalidationReport`] rather than raised:
    /// the caller must not roll back a committed write over cache
    /// bookkeeping. Entries missed by an incomplete pass stay stale until
    /// TTL or explicit eviction.
    pub fn committed<E: TrackedEntity>(self, entity: &E) -> InvalidationReport {
        let after = match self.write {
            WriteKind::Delete => BTreeMap::new(),
            WriteKind::Create | WriteKind::Update => entity.attributes(),
        };
        let changed = changed_attributes(&self.before, &after);
        let membership_changed = !matches!(self.write, WriteKind::Update);
        let identification = Descriptor::identification(self.kind.clone(), &self.identity);

        match self.engine.index().invalidate_for_write(
            &self.kind,
            &self.identity,
            &changed,
            membership_changed,
        ) {
            Ok(evicted) => InvalidationReport {
                evicted,
                complete: true,
                identification,
            },
            Err(error) => {
                tracing::warn!(
                    entity = %self.kind,
                    %error,
                    "post-commit invalidation failed; stale entries expire by TTL"
                );
                InvalidationReport {
                    evicted: 0,
                    complete: false,
                    identification,
                }
            }
        }
    }
}

/// Attribute names whose values differ between two images.
///
/// An attribute counts as changed when it was added, removed, or given a
/// different value. With one side empty, as for creates and deletes, every
/// attribute of the other side is changed.
fn changed_attributes(
    before: &BTreeMap<String, TrackValue>,
    after: &BTreeMap<String, TrackValue>,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, value) in before {
        if after.get(name) != Some(value) {
            changed.insert(name.clone());
        }
    }
    for name in after.keys() {
        if !before.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

/// Aggregated outcome across a batch of writes.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    evicted: usize,
    complete: bool,
    identifications: Vec<Descriptor>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            evicted: 0,
            complete: true,
            identifications: Vec::new(),
        }
    }

    /// Fold one write's report into the batch.
    pub fn absorb(&mut self, report: InvalidationReport) {
        self.evicted += report.evicted;
        self.complete &= report.complete;
        self.identifications.push(report.identification);
    }

    /// Total entries evicted across the batch.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Whether every write's invalidation pass ran to completion.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Identification descriptors of every written entity, in write order.
    pub fn identifications(&self) -> &[Descriptor] {
        &self.identifications
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
