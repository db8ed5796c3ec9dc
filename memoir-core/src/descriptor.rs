//! Dependency descriptors, the unit of cache bookkeeping

use crate::kind::{DependencyOp, EntityKind};
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Separator between descriptor fields in the encoded form.
///
/// Both selector shapes are serialized JSON, and serialized JSON escapes
/// control characters, so the raw unit separator can never appear inside a
/// field. That makes the encoding unambiguous without any quoting scheme.
const SEPARATOR: char = '\u{1f}';

/// One dependency edge: how a cached computation touched an entity kind.
///
/// # Design
///
/// A descriptor is `(entity, op, selector)`. The selector is the serialized
/// primary identity for `Identification` and the serialized predicate for
/// `Filter`/`Exclude`, both canonical JSON, so logically equal dependencies
/// compare and hash equal. Descriptors can only be built through the three
/// operation constructors (or decoded from an encoded form), which keeps
/// every selector canonical by construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    entity: EntityKind,
    op: DependencyOp,
    selector: String,
}

impl Descriptor {
    /// Direct dependency on one entity, selected by identity.
    pub fn identification(entity: EntityKind, identity: &Value) -> Self {
        Self {
            entity,
            op: DependencyOp::Identification,
            selector: identity.to_string(),
        }
    }

    /// Dependency on the inclusion predicate of a collection read.
    pub fn filter(entity: EntityKind, predicate: &Predicate) -> Self {
        Self {
            entity,
            op: DependencyOp::Filter,
            selector: predicate.selector(),
        }
    }

    /// Dependency on the exclusion predicate of a collection read.
    pub fn exclude(entity: EntityKind, predicate: &Predicate) -> Self {
        Self {
            entity,
            op: DependencyOp::Exclude,
            selector: predicate.selector(),
        }
    }

    pub fn entity(&self) -> &EntityKind {
        &self.entity
    }

    pub fn op(&self) -> DependencyOp {
        self.op
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Predicate parsed back out of a `Filter`/`Exclude` selector.
    ///
    /// Returns `None` for identification descriptors and for selectors that
    /// do not parse as a JSON object.
    pub fn predicate(&self) -> Option<Predicate> {
        match self.op {
            DependencyOp::Filter | DependencyOp::Exclude => {
                Predicate::from_selector(&self.selector)
            }
            DependencyOp::Identification => None,
        }
    }

    /// Single-string form used as the index table key.
    pub fn encode(&self) -> String {
        let mut encoded = String::with_capacity(
            self.entity.as_str().len() + self.op.as_str().len() + self.selector.len() + 2,
        );
        encoded.push_str(self.entity.as_str());
        encoded.push(SEPARATOR);
        encoded.push_str(self.op.as_str());
        encoded.push(SEPARATOR);
        encoded.push_str(&self.selector);
        encoded
    }

    /// Decode an encoded descriptor.
    ///
    /// Returns `None` if:
    /// - either separator is missing
    /// - the entity kind is empty
    /// - the operation name is unknown
    pub fn decode(encoded: &str) -> Option<Self> {
        let mut parts = encoded.splitn(3, SEPARATOR);
        let entity = parts.next()?;
        let op = DependencyOp::parse(parts.next()?)?;
        let selector = parts.next()?;
        if entity.is_empty() {
            return None;
        }
        Some(Self {
            entity: EntityKind::from(entity),
            op,
            selector: selector.to_string(),
        })
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.entity, self.op, self.selector)
    }
}

// =============================================================================
// TESTS
// =============================================================================
