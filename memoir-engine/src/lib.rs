//! Memoir Engine - Dependency-Tracked Memoization
//!
//! The engine proper: thread-local dependency tracking, the memoizing call
//! wrapper, dependency collection over call arguments, the shared
//! dependency index, and the write-path invalidator. Cached reads discover
//! what they depended on as they run; writes evict exactly the entries
//! whose dependencies they touched.

pub mod collector;
pub mod config;
pub mod index;
pub mod memo;
pub mod tracker;
pub mod writes;

pub use config::EngineConfig;
pub use index::{DependencyIndex, IndexTable};
pub use memo::{CacheEngine, EngineStats};
pub use tracker::TrackingScope;
pub use writes::{InvalidationReport, WriteBatch, WriteGuard, WriteKind};
