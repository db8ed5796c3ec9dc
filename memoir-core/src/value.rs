//! Structural value model scanned for dependencies
//!
//! Arguments to memoized calls are converted into [`TrackValue`] trees
//! before key derivation and dependency collection. The tree makes the data
//! self-describing: entities and predicate-scoped queries appear as explicit
//! nodes instead of being discovered by runtime type inspection, so the
//! collector is a plain recursive match.

use crate::descriptor::Descriptor;
use crate::kind::EntityKind;
use crate::predicate::Predicate;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A value as seen by key derivation and dependency collection.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackValue {
    /// Opaque leaf. Carries no dependency information.
    Plain(Value),
    /// A tracked entity instance.
    Entity(EntityRef),
    /// A predicate-scoped collection read.
    Query(QueryRef),
    /// Recurses into elements.
    List(Vec<TrackValue>),
    /// Recurses into values; keys carry no dependency information.
    Map(BTreeMap<String, TrackValue>),
}

impl TrackValue {
    /// The canonical JSON this value contributes to key derivation.
    ///
    /// Entities reduce to kind plus identity, never their attribute state,
    /// so two instances of the same logical entity always hash identically.
    /// Queries reduce to kind plus both predicates. The `$`-prefixed marker
    /// keys keep entity and query forms from colliding with plain objects:
    /// `$`-prefixed keys in plain data and map entries are escaped with a
    /// second `$`, so only the engine can spell a marker shape.
    pub fn key_form(&self) -> Value {
        match self {
            TrackValue::Plain(value) => escape_marker_keys(value),
            TrackValue::Entity(entity) => {
                let mut object = Map::new();
                object.insert(
                    "$entity".to_string(),
                    Value::String(entity.kind().as_str().to_string()),
                );
                object.insert("$id".to_string(), entity.identity().clone());
                Value::Object(object)
            }
            TrackValue::Query(query) => {
                let mut object = Map::new();
                object.insert(
                    "$query".to_string(),
                    Value::String(query.kind().as_str().to_string()),
                );
                object.insert("$filter".to_string(), query.filter().to_value());
                object.insert("$exclude".to_string(), query.exclude().to_value());
                Value::Object(object)
            }
            TrackValue::List(elements) => {
                Value::Array(elements.iter().map(TrackValue::key_form).collect())
            }
            TrackValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (escape_key(key), value.key_form()))
                    .collect(),
            ),
        }
    }
}

fn escape_key(key: &str) -> String {
    if key.starts_with('$') {
        format!("${key}")
    } else {
        key.to_string()
    }
}

/// Rewrite every `$`-prefixed object key in a plain JSON tree to `$$...`.
fn escape_marker_keys(value: &Value) -> Value {
    match value {
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (escape_key(key), escape_marker_keys(value)))
                .collect(),
        ),
        Value::Array(elements) => {
            Value::Array(elements.iter().map(escape_marker_keys).collect())
        }
        other => other.clone(),
    }
}

/// Reference to one tracked entity: kind, identity, and attribute values.
///
/// The attributes travel with the reference so that receiver-position scans
/// can reach dependencies hiding behind an entity's own fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    kind: EntityKind,
    identity: Value,
    attributes: BTreeMap<String, TrackValue>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, identity: Value) -> Self {
        Self {
            kind,
            identity,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach one named attribute value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: TrackValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn identity(&self) -> &Value {
        &self.identity
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &TrackValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The identification descriptor for this entity.
    pub fn identification(&self) -> Descriptor {
        Descriptor::identification(self.kind.clone(), &self.identity)
    }
}

/// Reference to a predicate-scoped collection read.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRef {
    kind: EntityKind,
    filter: Predicate,
    exclude: Predicate,
}

impl QueryRef {
    /// Unconstrained query over one entity kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filter: Predicate::new(),
            exclude: Predicate::new(),
        }
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_exclude(mut self, exclude: Predicate) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn filter(&self) -> &Predicate {
        &self.filter
    }

    pub fn exclude(&self) -> &Predicate {
        &self.exclude
    }

    /// Descriptor for the inclusion predicate.
    pub fn filter_descriptor(&self) -> Descriptor {
        Descriptor::filter(self.kind.clone(), &self.filter)
    }

    /// Descriptor for the exclusion predicate.
    pub fn exclude_descriptor(&self) -> Descriptor {
        Descriptor::exclude(self.kind.clone(), &self.exclude)
    }
}

/// Conversion into the tracked value model.
///
/// Domain entity types typically implement this alongside
/// [`TrackedEntity`](crate::entity::TrackedEntity) by returning
/// `TrackValue::Entity(self.entity_ref())`; query types return
/// `TrackValue::Query(self.query_ref())`. Plain data maps to `Plain`,
/// `List` and `Map` leaves.
pub trait Trackable {
    fn to_track_value(&self) -> TrackValue;
}

impl<T: Trackable + ?Sized> Trackable for &T {
    fn to_track_value(&self) -> TrackValue {
        (**self).to_track_value()
    }
}

impl Trackable for TrackValue {
    fn to_track_value(&self) -> TrackValue {
        self.clone()
    }
}

impl Trackable for EntityRef {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Entity(self.clone())
    }
}

impl Trackable for QueryRef {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Query(self.clone())
    }
}

macro_rules! impl_trackable_plain {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Trackable for $ty {
                fn to_track_value(&self) -> TrackValue {
                    TrackValue::Plain(Value::from(self.clone()))
                }
            }
        )*
    };
}

impl_trackable_plain!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String,
);

impl Trackable for str {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Plain(Value::from(self))
    }
}

impl Trackable for Uuid {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Plain(Value::String(self.to_string()))
    }
}

impl<T: Trackable> Trackable for Option<T> {
    fn to_track_value(&self) -> TrackValue {
        match self {
            Some(value) => value.to_track_value(),
            None => TrackValue::Plain(Value::Null),
        }
    }
}

impl<T: Trackable> Trackable for Vec<T> {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::List(self.iter().map(Trackable::to_track_value).collect())
    }
}

impl<T: Trackable> Trackable for [T] {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::List(self.iter().map(Trackable::to_track_value).collect())
    }
}

impl<T: Trackable> Trackable for BTreeMap<String, T> {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Map(
            self.iter()
                .map(|(key, value)| (key.clone(), value.to_track_value()))
                .collect(),
        )
    }
}

impl<T: Trackable> Trackable for HashMap<String, T> {
    fn to_track_value(&self) -> TrackValue {
        TrackValue::Map(
            self.iter()
                .map(|(key, value)| (key.clone(), value.to_track_value()))
                .collect(),
        )
    }
}

macro_rules! impl_trackable_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Trackable),+> Trackable for ($($name,)+) {
            fn to_track_value(&self) -> TrackValue {
                TrackValue::List(vec![$(self.$idx.to_track_value()),+])
            }
        }
    };
}

impl_trackable_tuple!(A: 0, B: 1);
impl_trackable_tuple!(A: 0, B: 1, C: 2);

// =============================================================================
// TESTS
// =============================================================================
