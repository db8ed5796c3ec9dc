//! Cache key derivation for memoized calls

use crate::error::{KeyError, MemoirResult};
use crate::value::{TrackValue, Trackable};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fully-qualified name of a memoized call site.
///
/// The path is part of the key document, so two functions with identical
/// arguments never share cache entries. By convention this is the
/// `module::function` path of the wrapped function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    path: String,
}

impl CallSite {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Start binding arguments to this site.
    pub fn bind(&self) -> BoundCall {
        BoundCall {
            site: self.clone(),
            args: Vec::new(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A call site with its positional arguments bound.
///
/// Binding normalizes each argument to its [`TrackValue`] form, which the
/// key derivation and the dependency collector both consume. Argument order
/// is significant.
#[derive(Debug, Clone)]
pub struct BoundCall {
    site: CallSite,
    args: Vec<TrackValue>,
}

impl BoundCall {
    /// Bind one argument through its [`Trackable`] conversion.
    pub fn arg(mut self, value: &impl Trackable) -> Self {
        self.args.push(value.to_track_value());
        self
    }

    /// Bind one already-converted value.
    pub fn arg_value(mut self, value: TrackValue) -> Self {
        self.args.push(value);
        self
    }

    /// Bind one argument through serde.
    ///
    /// The escape hatch for plain-data types without a [`Trackable`]
    /// implementation. Serialization failure is fatal to the call: there is
    /// no way to derive a faithful key for an argument that cannot be
    /// serialized.
    pub fn arg_serialized<T: Serialize>(mut self, value: &T) -> MemoirResult<Self> {
        let position = self.args.len();
        let json = serde_json::to_value(value).map_err(|e| KeyError::Unserializable {
            position,
            reason: e.to_string(),
        })?;
        self.args.push(TrackValue::Plain(json));
        Ok(self)
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    pub fn args(&self) -> &[TrackValue] {
        &self.args
    }

    /// Derive the cache key for this call.
    ///
    /// The key document is canonical JSON with sorted object keys and
    /// entities reduced to kind plus identity, so equal logical calls
    /// produce equal keys no matter where they were built or which instance
    /// of an entity was passed.
    pub fn cache_key(&self) -> CacheKey {
        let args: Vec<Value> = self.args.iter().map(TrackValue::key_form).collect();
        let mut document = Map::new();
        document.insert(
            "call".to_string(),
            Value::String(self.site.path.clone()),
        );
        document.insert("args".to_string(), Value::Array(args));

        let mut hasher = Sha256::new();
        hasher.update(Value::Object(document).to_string().as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        CacheKey(bytes)
    }
}

/// 32-byte digest identifying one memoized call.
///
/// Displays and serializes as lowercase hex. Ordered, so index rows keep a
/// deterministic wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a key from its hex form. Returns `None` for anything that is
    /// not exactly 64 hex characters.
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let decoded = hex::decode(hex_str).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_str = String::deserialize(deserializer)?;
        CacheKey::from_hex(&hex_str)
            .ok_or_else(|| serde::de::Error::custom("cache key is not 64 hex characters"))
    }
}

// =============================================================================
// TESTS
// =============================================================================
