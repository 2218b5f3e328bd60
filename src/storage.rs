//! Key-value storage adapters backing the audit history.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// Storage keys
pub mod keys {
    pub const AUDIT_HISTORY: &str = concat!("checkout:", "audit_history");
}

/// Pluggable key-value store. Implementations must tolerate concurrent
/// readers; the session serializes writers.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// In-memory storage, dropped with the process. Useful for tests and for
/// callers that restore state through other means.
#[derive(Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").finish()
    }
}

/// File-backed storage.
///
/// Keeps all keys in a single `checkout.json` inside the given directory,
/// rewritten as a whole on every mutation.
pub struct FileStorage {
    path: std::path::PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) storage under `dir`. The directory must already
    /// exist; returns `None` when it does not.
    pub fn new(dir: &Path) -> Option<Self> {
        if !dir.is_dir() {
            return None;
        }

        let path = dir.join("checkout.json");
        let cache = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        Some(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn flush(&self) {
        if let Ok(cache) = self.cache.read()
            && let Ok(contents) = serde_json::to_string_pretty(&*cache)
        {
            let _ = std::fs::write(&self.path, contents);
        }
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value.to_string());
        }
        self.flush();
    }

    fn remove(&self, key: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(key);
        }
        self.flush();
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k"), None);
        storage.set("k", "v");
        assert_eq!(storage.get("k"), Some("v".to_string()));
        storage.remove("k");
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = FileStorage::new(dir.path()).unwrap();
            storage.set(keys::AUDIT_HISTORY, "{\"counter\":3}");
        }

        let reopened = FileStorage::new(dir.path()).unwrap();
        assert_eq!(
            reopened.get(keys::AUDIT_HISTORY),
            Some("{\"counter\":3}".to_string())
        );
    }

    #[test]
    fn file_storage_requires_existing_dir() {
        assert!(FileStorage::new(Path::new("/definitely/not/here")).is_none());
    }
}
