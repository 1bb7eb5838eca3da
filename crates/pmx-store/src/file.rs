//! File-backed session store for server and CLI hosts.
//!
//! One JSON document per namespace under the store directory, written
//! through on every mutation. The payload is a handful of small records
//! (credentials, provisioning flags), so rewrite-on-put is fine.

use crate::error::StoreResult;
use crate::session::{SessionStore, StoreKey};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// `SessionStore` persisting each namespace to `<dir>/<namespace>.json`.
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles across namespaces.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.json"))
    }

    fn load_namespace(path: &Path) -> StoreResult<BTreeMap<String, String>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn store_namespace(path: &Path, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        if entries.is_empty() {
            match fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
        fs::write(path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get_raw(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        let entries = Self::load_namespace(&self.namespace_path(key.namespace()))?;
        Ok(entries.get(key.key()).cloned())
    }

    fn put_raw(&self, key: &StoreKey, value: String) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let path = self.namespace_path(key.namespace());
        let mut entries = Self::load_namespace(&path)?;
        entries.insert(key.key().to_string(), value);
        Self::store_namespace(&path, &entries)
    }

    fn invalidate(&self, key: &StoreKey) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let path = self.namespace_path(key.namespace());
        let mut entries = Self::load_namespace(&path)?;
        if entries.remove(key.key()).is_some() {
            Self::store_namespace(&path, &entries)?;
        }
        Ok(())
    }

    fn invalidate_prefix(&self, namespace: &str, prefix: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let path = self.namespace_path(namespace);
        let mut entries = Self::load_namespace(&path)?;
        let prefix = prefix.to_lowercase();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        if entries.len() != before {
            Self::store_namespace(&path, &entries)?;
        }
        Ok(())
    }
}
