//! Named JSON document storage with default-on-missing semantics
//!
//! Every durable singleton document (knowledge book, progression state,
//! word bank, interaction log, streak ledger) lives in one file under the
//! data directory. A missing or unparsable file is replaced by its default
//! shape and never surfaces a parse error to the caller. Writers for the
//! same key are serialized behind a per-key mutex; the read/write contract
//! itself stays last-write-wins.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};

/// JSON document storage backend
pub struct DocumentStore {
    base_path: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentStore {
    /// Create a new document store rooted at the config's data directory
    pub fn new(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            base_path: config.data_dir.clone(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Read a document, writing and returning `default` when the file is
    /// missing or corrupt.
    pub fn read_or_default<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = self.document_path(key);
        if !path.exists() {
            tracing::debug!(key, "document missing, seeding default shape");
            self.write_locked(key, &default)?;
            return Ok(default);
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(key, %err, "corrupt document, resetting to default");
                self.write_locked(key, &default)?;
                Ok(default)
            }
        }
    }

    /// Full overwrite of a document. No partial-field update exists.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_locked(key, value)
    }

    fn write_locked<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.document_path(key);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|e| Error::storage(format!("write {key}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    fn store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(dir.path());
        let store = DocumentStore::new(&config).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_document_seeds_default() {
        let (dir, store) = store();
        let default = Doc { name: "seed".into(), count: 0 };

        let read = store.read_or_default("doc.json", default.clone()).unwrap();
        assert_eq!(read, default);
        assert!(dir.path().join("doc.json").exists());
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, store) = store();
        let doc = Doc { name: "hello".into(), count: 7 };

        store.write("doc.json", &doc).unwrap();
        let read = store
            .read_or_default("doc.json", Doc { name: String::new(), count: 0 })
            .unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn corrupt_document_self_heals() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("doc.json"), "{not json!").unwrap();

        let default = Doc { name: "reset".into(), count: 1 };
        let read = store.read_or_default("doc.json", default.clone()).unwrap();
        assert_eq!(read, default);

        // the file on disk was rewritten with the default shape
        let raw = std::fs::read_to_string(dir.path().join("doc.json")).unwrap();
        let reparsed: Doc = serde_json::from_str(&raw).unwrap();
        assert_eq!(reparsed, default);
    }
}
