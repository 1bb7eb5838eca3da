//! The `SessionStore` abstraction.
//!
//! Session-scoped key-value persistence behind a narrow trait so the same
//! pipeline logic runs against an in-memory store (tests), a file-backed
//! store (server/CLI hosts), or a browser-storage adapter. Keys are
//! namespaced as `"<store-name>:<key-lowercased>"` and every value is a
//! JSON document carrying the write timestamp, which TTL-aware reads use
//! to treat stale entries as misses.

use crate::error::StoreResult;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite store key: namespace plus a lowercased entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    namespace: String,
    key: String,
}

impl StoreKey {
    /// Build a key. The entry part is lowercased so address-derived keys
    /// are checksum-insensitive.
    pub fn new(namespace: impl Into<String>, key: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.as_ref().to_lowercase(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// A stored value with its write timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

impl<T> Stored<T> {
    pub fn now(value: T) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
        }
    }

    /// Whether the entry is older than the given TTL.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.timestamp > ttl
    }
}

/// Session-scoped key-value persistence.
///
/// Writes are last-writer-wins per key; a single active session is assumed,
/// so no concurrent-writer detection is provided.
pub trait SessionStore: Send + Sync {
    /// Fetch the raw JSON document for a key, if present.
    fn get_raw(&self, key: &StoreKey) -> StoreResult<Option<String>>;

    /// Write the raw JSON document for a key.
    fn put_raw(&self, key: &StoreKey, value: String) -> StoreResult<()>;

    /// Remove a single entry. Removing a missing key is a no-op.
    fn invalidate(&self, key: &StoreKey) -> StoreResult<()>;

    /// Remove every entry in a namespace whose key starts with `prefix`.
    fn invalidate_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<()>;
}

/// Serialize and store a value with the current timestamp.
pub fn put_json<T: Serialize>(
    store: &dyn SessionStore,
    key: &StoreKey,
    value: &T,
) -> StoreResult<()> {
    let doc = serde_json::to_string(&Stored::now(value))?;
    store.put_raw(key, doc)
}

/// Read a stored value regardless of age.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &StoreKey,
) -> StoreResult<Option<Stored<T>>> {
    match store.get_raw(key)? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(stored) => Ok(Some(stored)),
            Err(err) => {
                // A corrupt entry is a miss, not a hard failure.
                tracing::warn!(%key, %err, "dropping unreadable store entry");
                store.invalidate(key)?;
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Read a stored value, treating entries older than `ttl` as misses.
pub fn get_json_fresh<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: &StoreKey,
    ttl: Duration,
) -> StoreResult<Option<T>> {
    match get_json::<T>(store, key)? {
        Some(stored) if !stored.is_expired(ttl) => Ok(Some(stored.value)),
        Some(_) => {
            tracing::debug!(%key, "store entry past TTL, treating as miss");
            Ok(None)
        }
        None => Ok(None),
    }
}
