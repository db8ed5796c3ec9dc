//! Filter predicates for collection-shaped dependencies

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Conjunction of field constraints scoping a tracked collection.
///
/// Fields are kept ordered so two predicates with the same constraints
/// always render to the same selector string, regardless of how they were
/// built. An empty predicate means "unconstrained": as a filter it matches
/// every entity of its kind, as an exclusion it removes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Predicate {
    fields: BTreeMap<String, Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one field constraint. Later constraints on the same field win.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Predicate as a JSON object value.
    pub fn to_value(&self) -> Value {
        let object: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(object)
    }

    /// Canonical JSON selector for this predicate.
    pub fn selector(&self) -> String {
        self.to_value().to_string()
    }

    /// Parse a selector back into a predicate. Returns `None` for anything
    /// that is not a JSON object.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(selector) {
            Ok(Value::Object(object)) => Some(Self {
                fields: object.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Conservative write-match rule: could a change to the named attributes
    /// flip membership under this predicate?
    ///
    /// True when any constrained field was changed. Constraint values are
    /// deliberately not consulted: an entity may enter or leave the
    /// predicate's set either way, and a false positive only costs a
    /// recomputation while a false negative would serve stale data. An
    /// empty predicate constrains nothing and touches nothing; membership
    /// of the unconstrained collection moves only when entities are created
    /// or deleted, which the write path handles separately.
    pub fn touches(&self, changed: &BTreeSet<String>) -> bool {
        self.fields.keys().any(|name| changed.contains(name))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changed(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_selector_is_sorted_and_order_independent() {
        let a = Predicate::new().field("role", "admin").field("active", true);
        let b = Predicate::new().field("active", true).field("role", "admin");
        assert_eq!(a.selector(), b.selector());
        assert_eq!(a.selector(), r#"{"active":true,"role":"admin"}"#);
    }

    #[test]
    fn test_empty_selector_is_empty_object() {
        assert_eq!(Predicate::new().selector(), "{}");
    }

    #[test]
    fn test_later_constraint_on_same_field_wins() {
        let p = Predicate::new().field("active", false).field("active", true);
        assert_eq!(p.len(), 1);
        assert_eq!(p.selector(), r#"{"active":true}"#);
    }

    #[test]
    fn test_from_selector_roundtrip() {
        let p = Predicate::new()
            .field("active", true)
            .field("age", 30)
            .field("name", "ada");
        let parsed = Predicate::from_selector(&p.selector()).expect("parse");
        assert_eq!(parsed, p);
    }

    #[test]
    fn test_from_selector_rejects_non_objects() {
        assert!(Predicate::from_selector("[1,2]").is_none());
        assert!(Predicate::from_selector("\"active\"").is_none());
        assert!(Predicate::from_selector("not json").is_none());
    }

    #[test]
    fn test_touches_empty_predicate_touches_nothing() {
        let p = Predicate::new();
        assert!(!p.touches(&changed(&["anything"])));
        assert!(!p.touches(&changed(&[])));
    }

    #[test]
    fn test_touches_intersecting_field() {
        let p = Predicate::new().field("active", true).field("role", "admin");
        assert!(p.touches(&changed(&["active"])));
        assert!(p.touches(&changed(&["email", "role"])));
    }

    #[test]
    fn test_touches_disjoint_fields_do_not_match() {
        let p = Predicate::new().field("active", true);
        assert!(!p.touches(&changed(&["email", "name"])));
        assert!(!p.touches(&changed(&[])));
    }

    #[test]
    fn test_touches_ignores_constraint_values() {
        // Membership may flip either way; the value is deliberately not consulted.
        let p = Predicate::new().field("active", json!(false));
        assert!(p.touches(&changed(&["active"])));
    }
}
