//! Device-local key-value store, the stand-in for the browser's
//! localStorage: linked payout accounts (namespaced per user) and the
//! administrator profile live here, never in the database. Writes are
//! bounded by a byte quota; hitting it trims the known list-valued
//! keys to their most recent entries and retries once.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Roughly what browsers grant an origin.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// How many entries of each trimmable list survive a quota trim.
pub const KEEP_RECENT: usize = 50;

/// List-valued keys that are safe to trim when the quota is hit.
const TRIM_KEYS: [&str; 3] = ["cachedMessages", "cachedNotifications", "cachedTransactions"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct LocalStore {
    path: PathBuf,
    quota: usize,
    entries: Mutex<HashMap<String, Value>>,
}

impl LocalStore {
    /// Opens the store at `path`. A missing or corrupted file reads as
    /// an empty store rather than an error.
    pub fn open(path: impl AsRef<Path>, quota: usize) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        LocalStore {
            path,
            quota,
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Deserializes the entry at `key`, falling back to the default on
    /// a missing or malformed value.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.lock().unwrap();
        let mut candidate = entries.clone();
        candidate.insert(key.to_string(), value.clone());
        let serialized = serde_json::to_string(&candidate)?;
        if serialized.len() > self.quota {
            return Err(StorageError::QuotaExceeded);
        }
        fs::write(&self.path, serialized)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    /// `set`, with quota recovery: trim the trimmable keys down to
    /// their most recent entries and retry exactly once.
    pub fn safe_set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        match self.set(key, value) {
            Err(StorageError::QuotaExceeded) => {
                tracing::warn!("Storage quota exceeded, trimming old entries");
                self.trim_old_entries()?;
                self.set(key, value)
            }
            other => other,
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_some() {
            fs::write(&self.path, serde_json::to_string(&*entries)?)?;
        }
        Ok(())
    }

    /// Serialized size of the store as it would be written to disk.
    pub fn usage(&self) -> usize {
        serde_json::to_string(&*self.entries.lock().unwrap())
            .map(|raw| raw.len())
            .unwrap_or(0)
    }

    /// Device-store key for a user's linked payout account. Namespaced
    /// per user so nothing leaks between accounts on a shared device.
    pub fn linked_account_key(user_id: &str) -> String {
        format!("linkedAccount_{}", user_id)
    }

    fn trim_old_entries(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap();
        for key in TRIM_KEYS {
            if let Some(Value::Array(items)) = entries.get_mut(key) {
                if items.len() > KEEP_RECENT {
                    // Lists are append-ordered, so the most recent
                    // entries are at the tail.
                    let excess = items.len() - KEEP_RECENT;
                    items.drain(..excess);
                }
            }
        }
        fs::write(&self.path, serde_json::to_string(&*entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir, quota: usize) -> LocalStore {
        LocalStore::open(dir.path().join("device_store.json"), quota)
    }

    #[test]
    fn test_get_or_default_falls_back_on_malformed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, DEFAULT_QUOTA_BYTES);
        store.set("linkedAccount_u1", &json!("not an object")).unwrap();

        let account: crate::models::LinkedAccount = store.get_or_default("linkedAccount_u1");
        assert_eq!(account.bank, "");
    }

    #[test]
    fn test_corrupted_file_reads_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_store.json");
        fs::write(&path, "{{{ not json").unwrap();

        let store = LocalStore::open(&path, DEFAULT_QUOTA_BYTES);
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_store.json");
        let store = LocalStore::open(&path, DEFAULT_QUOTA_BYTES);
        store.set("adminProfile", &json!({"manager_name": "John Smith"})).unwrap();
        drop(store);

        let reopened = LocalStore::open(&path, DEFAULT_QUOTA_BYTES);
        assert_eq!(
            reopened.get("adminProfile").unwrap()["manager_name"],
            "John Smith"
        );
    }

    #[test]
    fn test_quota_trim_keeps_most_recent_fifty_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_store.json");

        // 100 cached message entries, oldest first.
        let messages: Vec<Value> = (0..100)
            .map(|i| json!({"id": format!("m{:03}", i), "content": "x".repeat(32)}))
            .collect();
        {
            let store = LocalStore::open(&path, DEFAULT_QUOTA_BYTES);
            store.set("cachedMessages", &messages).unwrap();
        }

        // Reopen with a quota the current contents barely fit in, so
        // the next write trips it.
        let usage = LocalStore::open(&path, DEFAULT_QUOTA_BYTES).usage();
        let store = LocalStore::open(&path, usage + 16);

        let account = json!({"bank": "BDO", "account_number": "0001", "account_name": "Test"});
        store
            .safe_set("linkedAccount_u1", &account)
            .expect("write should succeed after trimming");

        let Some(Value::Array(kept)) = store.get("cachedMessages") else {
            panic!("cachedMessages should still be an array");
        };
        assert_eq!(kept.len(), KEEP_RECENT);
        // the survivors are the most recent entries
        assert_eq!(kept[0]["id"], "m050");
        assert_eq!(kept[KEEP_RECENT - 1]["id"], "m099");
        assert_eq!(store.get("linkedAccount_u1").unwrap()["bank"], "BDO");
    }

    #[test]
    fn test_set_without_quota_pressure_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, DEFAULT_QUOTA_BYTES);
        let messages: Vec<Value> = (0..10).map(|i| json!({"id": i})).collect();
        store.set("cachedMessages", &messages).unwrap();
        store.safe_set("linkedAccount_u1", &json!({"bank": "BPI"})).unwrap();

        let Some(Value::Array(kept)) = store.get("cachedMessages") else {
            panic!("cachedMessages should still be an array");
        };
        assert_eq!(kept.len(), 10);
    }
}
