//! Entity kind and dependency operation identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of one tracked entity type.
///
/// The set of kinds is open: applications register their own model types,
/// so this is a string newtype rather than a closed enum. Ordering and
/// hashing follow the name, which keeps index tables deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for EntityKind {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a cached computation touched data.
///
/// `Identification` is a direct read of one entity. `Filter` and `Exclude`
/// are the two predicate positions of a collection read; a collection always
/// yields both, even when one predicate is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyOp {
    Identification,
    Filter,
    Exclude,
}

impl DependencyOp {
    /// Stable wire name, used in encoded descriptors and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyOp::Identification => "identification",
            DependencyOp::Filter => "filter",
            DependencyOp::Exclude => "exclude",
        }
    }

    /// Parse a wire name back to the operation.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "identification" => Some(DependencyOp::Identification),
            "filter" => Some(DependencyOp::Filter),
            "exclude" => Some(DependencyOp::Exclude),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================
