//! Dependency sets collected for tracked executions

use crate::descriptor::Descriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The set of dependency descriptors one computation touched.
///
/// Backed by an ordered set so the serialized form is deterministic and
/// duplicate descriptors collapse. Stored alongside the cached value, which
/// ties both to the same expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet {
    descriptors: BTreeSet<Descriptor>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one descriptor. Returns `false` if it was already present.
    pub fn insert(&mut self, descriptor: Descriptor) -> bool {
        self.descriptors.insert(descriptor)
    }

    /// Union another set into this one.
    pub fn merge(&mut self, other: &DependencySet) {
        self.descriptors
            .extend(other.descriptors.iter().cloned());
    }

    pub fn contains(&self, descriptor: &Descriptor) -> bool {
        self.descriptors.contains(descriptor)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    /// True when every descriptor of `other` is present here.
    pub fn is_superset(&self, other: &DependencySet) -> bool {
        self.descriptors.is_superset(&other.descriptors)
    }
}

impl FromIterator<Descriptor> for DependencySet {
    fn from_iter<I: IntoIterator<Item = Descriptor>>(iter: I) -> Self {
        Self {
            descriptors: iter.into_iter().collect(),
        }
    }
}

impl Extend<Descriptor> for DependencySet {
    fn extend<I: IntoIterator<Item = Descriptor>>(&mut self, iter: I) {
        self.descriptors.extend(iter);
    }
}

impl IntoIterator for DependencySet {
    type Item = Descriptor;
    type IntoIter = std::collections::btree_set::IntoIter<Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a Descriptor;
    type IntoIter = std::collections::btree_set::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
