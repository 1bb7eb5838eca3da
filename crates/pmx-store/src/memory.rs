//! In-memory session store, used in tests and ephemeral sessions.

use crate::error::StoreResult;
use crate::session::{SessionStore, StoreKey};
use dashmap::DashMap;

/// Process-local `SessionStore` backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, for tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get_raw(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        Ok(self.entries.get(&key.to_string()).map(|e| e.value().clone()))
    }

    fn put_raw(&self, key: &StoreKey, value: String) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn invalidate(&self, key: &StoreKey) -> StoreResult<()> {
        self.entries.remove(&key.to_string());
        Ok(())
    }

    fn invalidate_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<()> {
        let full_prefix = format!("{namespace}:{}", prefix.to_lowercase());
        self.entries.retain(|k, _| !k.starts_with(&full_prefix));
        Ok(())
    }
}
