//! Error types for memoir operations

use thiserror::Error;

/// Shared cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend failed during {op} on {key}: {reason}")]
    Backend {
        op: &'static str,
        key: String,
        reason: String,
    },
}

/// Cache key derivation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Argument at position {position} cannot be serialized: {reason}")]
    Unserializable { position: usize, reason: String },
}

/// Dependency index errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Index lock still contended after {attempts} attempts")]
    LockContended { attempts: u32 },

    #[error("Corrupt index table: {reason}")]
    Corrupt { reason: String },
}

/// Cached entry and computation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache entry codec failed for {key}: {reason}")]
    Codec { key: String, reason: String },

    #[error("Cached computation failed: {reason}")]
    ComputeFailed { reason: String },
}

/// Master error type for all memoir operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoirError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for memoir operations.
pub type MemoirResult<T> = Result<T, MemoirError>;

// =============================================================================
// TESTS
// =============================================================================
