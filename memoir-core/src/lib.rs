//! Memoir Core - Data Model
//!
//! Pure data types for the dependency-tracked cache: entity kinds,
//! dependency descriptors, predicates, track values, cache keys, and the
//! error taxonomy. No I/O lives here; the store and engine crates build on
//! these types.

pub mod deps;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod key;
pub mod kind;
pub mod predicate;
pub mod value;

pub use deps::DependencySet;
pub use descriptor::Descriptor;
pub use entity::{TrackedEntity, TrackedQuery};
pub use error::{CacheError, IndexError, KeyError, MemoirError, MemoirResult, StoreError};
pub use key::{BoundCall, CacheKey, CallSite};
pub use kind::{DependencyOp, EntityKind};
pub use predicate::Predicate;
pub use value::{EntityRef, QueryRef, TrackValue, Trackable};
