//! Memoir Store - Shared Cache Backends
//!
//! The store abstraction the engine caches through: a key/value service
//! with TTL support and an atomic set-if-absent primitive, plus the
//! in-process reference backend and the TTL lease lock built on top of it.
//! Every process that shares a cache shares one of these stores.

pub mod lock;
pub mod memory;
pub mod traits;

pub use lock::{LockGuard, TtlLock};
pub use memory::MemoryStore;
pub use traits::{CacheStore, StoreStats};
