//! Persistence ports for session-scoped and cross-session state.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::types::{EngineError, EngineResult};

/// Key of the session-scoped variant assignment.
pub const ASSIGNED_VARIANT_KEY: &str = "assignedVariant";

/// Key of the cross-session frequency record.
pub const LAST_SHOWN_AT_KEY: &str = "lastShownAt";

/// A string key/value store, the shape of browser storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> EngineResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> EngineResult<()>;
    fn remove(&mut self, key: &str) -> EngineResult<()>;
}

/// Volatile store that lives as long as the value does.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> EngineResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> EngineResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store whose every call fails, as when storage is disabled or blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

impl KeyValueStore for UnavailableStore {
    fn get(&self, _key: &str) -> EngineResult<Option<String>> {
        Err(EngineError::Storage("storage unavailable".to_string()))
    }

    fn set(&mut self, _key: &str, _value: &str) -> EngineResult<()> {
        Err(EngineError::Storage("storage unavailable".to_string()))
    }

    fn remove(&mut self, _key: &str) -> EngineResult<()> {
        Err(EngineError::Storage("storage unavailable".to_string()))
    }
}

/// Durable store backed by a JSON object on disk.
///
/// The file is shared by every session using the same path, so each call
/// reads it afresh. Writes re-read, update and rewrite the whole file
/// through a temporary sibling, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// Fails when an existing file is not a JSON object of strings.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let store = Self {
            path: path.to_path_buf(),
        };
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> EngineResult<BTreeMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Storage(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Saved state file: {}", self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> EngineResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> EngineResult<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&mut self, key: &str) -> EngineResult<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_unavailable_store_always_errors() {
        let mut store = UnavailableStore;
        assert!(store.get(LAST_SHOWN_AT_KEY).is_err());
        assert!(store.set(LAST_SHOWN_AT_KEY, "x").is_err());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set(LAST_SHOWN_AT_KEY, "2026-01-01T00:00:00Z").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(LAST_SHOWN_AT_KEY).unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_file_store_sees_writes_from_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut first = FileStore::open(&path).unwrap();
        let mut second = FileStore::open(&path).unwrap();

        first.set(LAST_SHOWN_AT_KEY, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            second.get(LAST_SHOWN_AT_KEY).unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );

        second.set(ASSIGNED_VARIANT_KEY, "guide").unwrap();
        assert_eq!(
            first.get(LAST_SHOWN_AT_KEY).unwrap().as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(first.get(ASSIGNED_VARIANT_KEY).unwrap().as_deref(), Some("guide"));

        first.remove(LAST_SHOWN_AT_KEY).unwrap();
        assert_eq!(second.get(LAST_SHOWN_AT_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(FileStore::open(&path).is_err());
    }

    #[test]
    fn test_file_store_empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"\n").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(LAST_SHOWN_AT_KEY).unwrap(), None);
    }
}
