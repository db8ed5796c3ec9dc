//! Capability traits implemented by tracked domain types

use crate::kind::EntityKind;
use crate::predicate::Predicate;
use crate::value::{EntityRef, QueryRef, TrackValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// A domain type whose instances are tracked entities.
///
/// # Design
///
/// The engine never inspects concrete types; it works on the
/// [`EntityRef`] this trait produces. Implementors provide three things:
/// the kind name shared by every instance, a stable serializable identity,
/// and the named attribute values in trackable form. Identity must not
/// change over the life of the record; it is what ties cache entries to
/// later writes.
///
/// Types usually also implement [`Trackable`](crate::value::Trackable) as
/// `TrackValue::Entity(self.entity_ref())` so instances can be bound as
/// call arguments directly.
pub trait TrackedEntity {
    /// Kind name shared by every instance of the implementing type.
    fn entity_kind() -> EntityKind
    where
        Self: Sized;

    /// Stable primary identity, serialized.
    fn identity(&self) -> Value;

    /// Named attribute values in trackable form.
    fn attributes(&self) -> BTreeMap<String, TrackValue>;

    /// Entity reference carrying kind, identity, and attributes.
    fn entity_ref(&self) -> EntityRef
    where
        Self: Sized,
    {
        let mut entity = EntityRef::new(Self::entity_kind(), self.identity());
        for (name, value) in self.attributes() {
            entity = entity.with_attribute(name, value);
        }
        entity
    }
}

/// A lazily-evaluated collection scoped by filter and exclusion predicates.
///
/// Both predicates always exist; an empty filter means the whole kind, an
/// empty exclusion removes nothing.
pub trait TrackedQuery {
    /// Kind of the entities the collection ranges over.
    fn entity_kind() -> EntityKind
    where
        Self: Sized;

    /// Inclusion predicate.
    fn filter(&self) -> Predicate;

    /// Exclusion predicate.
    fn exclude(&self) -> Predicate;

    /// Query reference carrying kind and both predicates.
    fn query_ref(&self) -> QueryRef
    where
        Self: Sized,
    {
        QueryRef::new(Self::entity_kind())
            .with_filter(self.filter())
            .with_exclude(self.exclude())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Trackable;
    use serde_json::json;

    struct User {
        id: i64,
        email: String,
        active: bool,
    }

    impl TrackedEntity for User {
        fn entity_kind() -> EntityKind {
            EntityKind::from("User")
        }

        fn identity(&self) -> Value {
            json!(self.id)
        }

        fn attributes(&self) -> BTreeMap<String, TrackValue> {
            [
                ("email".to_string(), self.email.to_track_value()),
                ("active".to_string(), self.active.to_track_value()),
            ]
            .into_iter()
            .collect()
        }
    }

    struct ActiveUsers;

    impl TrackedQuery for ActiveUsers {
        fn entity_kind() -> EntityKind {
            EntityKind::from("User")
        }

        fn filter(&self) -> Predicate {
            Predicate::new().field("active", true)
        }

        fn exclude(&self) -> Predicate {
            Predicate::new()
        }
    }

    #[test]
    fn test_entity_ref_carries_kind_identity_attributes() {
        let user = User {
            id: 7,
            email: "ada@example.com".to_string(),
            active: true,
        };
        let entity = user.entity_ref();
        assert_eq!(entity.kind().as_str(), "User");
        assert_eq!(entity.identity(), &json!(7));
        assert_eq!(entity.attributes().count(), 2);
    }

    #[test]
    fn test_query_ref_carries_both_predicates() {
        let query = ActiveUsers.query_ref();
        assert_eq!(query.kind().as_str(), "User");
        assert_eq!(query.filter().selector(), r#"{"active":true}"#);
        assert!(query.exclude().is_empty());
    }
}
