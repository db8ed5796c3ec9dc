//! Dependency collection over call arguments
//!
//! A pure recursive scan with no I/O and no registry. Entities contribute
//! their identification descriptor, queries contribute both predicate
//! descriptors, containers recurse, and plain values contribute nothing.
//! Query predicates are collected even when empty: an empty filter is the
//! "whole collection" dependency and must be indexable like any other.

use memoir_core::{DependencySet, TrackValue};

/// Collect the descriptors one value implies.
pub fn collect(value: &TrackValue, deps: &mut DependencySet) {
    match value {
        TrackValue::Plain(_) => {}
        TrackValue::Entity(entity) => {
            deps.insert(entity.identification());
        }
        TrackValue::Query(query) => {
            deps.insert(query.filter_descriptor());
            deps.insert(query.exclude_descriptor());
        }
        TrackValue::List(elements) => {
            for element in elements {
                collect(element, deps);
            }
        }
        TrackValue::Map(entries) => {
            for entry in entries.values() {
                collect(entry, deps);
            }
        }
    }
}

/// Collect across every argument of a bound call.
///
/// When the first argument is an entity, the call is a method on it, and
/// the receiver's attribute values are scanned too: a result computed from
/// an entity's fields depends on whatever those fields reference. Entities
/// anywhere else contribute only their identity.
pub fn collect_call(args: &[TrackValue], deps: &mut DependencySet) {
    for arg in args {
        collect(arg, deps);
    }
    if let Some(TrackValue::Entity(receiver)) = args.first() {
        for (_, value) in receiver.attributes() {
            collect(value, deps);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
