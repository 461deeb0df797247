//! Offline key-value store with optional file persistence.

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("value could not be (de)serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A cloneable async key-value store.
///
/// Values are kept as JSON. When opened with a path, every `put` rewrites the
/// snapshot file so a later instance on the same path sees the value.
#[derive(Debug, Clone)]
pub struct OfflineStore {
    entries: Arc<DashMap<String, Value>>,
    path: Option<PathBuf>,
    /// Serializes snapshot writes.
    write_lock: Arc<Mutex<()>>,
}

impl OfflineStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            path: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a store persisted at `path`, loading existing entries if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                let map: BTreeMap<String, Value> = serde_json::from_slice(&bytes)?;
                for (key, value) in map {
                    store.entries.insert(key, value);
                }
                tracing::debug!(path = %path.display(), entries = store.entries.len(), "Loaded offline store");
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// With a backing file, the value becomes visible only after the snapshot
    /// containing it has been written.
    pub async fn put(&self, key: impl Into<String>, value: impl Serialize) -> Result<(), StoreError> {
        let key = key.into();
        let value = serde_json::to_value(value)?;

        let Some(path) = &self.path else {
            self.entries.insert(key, value);
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.snapshot();
        snapshot.insert(key.clone(), value.clone());
        write_snapshot(path, &snapshot).await?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Fetch the value stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    /// Fetch and deserialize the value stored under `key`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

async fn write_snapshot(path: &Path, snapshot: &BTreeMap<String, Value>) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::debug!(path = %path.display(), entries = snapshot.len(), "Saved offline store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = OfflineStore::in_memory();
        assert!(store.get("somekey").await.unwrap().is_none());

        store.put("somekey", "Hello").await.unwrap();
        assert_eq!(store.get("somekey").await.unwrap(), Some(Value::from("Hello")));

        store.put("somekey", 42).await.unwrap();
        assert_eq!(store.get_as::<u32>("somekey").await.unwrap(), Some(42));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_structured_values() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Draft {
            title: String,
            tags: Vec<String>,
        }

        let store = OfflineStore::in_memory();
        let draft = Draft {
            title: "notes".into(),
            tags: vec!["a".into(), "b".into()],
        };
        store.put("draft", &draft).await.unwrap();

        assert_eq!(store.get_as::<Draft>("draft").await.unwrap(), Some(draft));
        assert!(matches!(
            store.get_as::<u8>("draft").await,
            Err(StoreError::Serialize(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let path = std::env::temp_dir().join(format!("offline_store_{}.json", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let store = OfflineStore::open(&path).await.unwrap();
        assert!(store.is_empty());
        store.put("somekey", "Hello").await.unwrap();

        let reopened = OfflineStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("somekey").await.unwrap(), Some(Value::from("Hello")));

        tokio::fs::remove_file(&path).await.unwrap_or_default();
    }

    #[tokio::test]
    async fn test_failed_write_leaves_value_unset() {
        let dir = std::env::temp_dir().join(format!("offline_store_missing_{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        let store = OfflineStore::open(dir.join("store.json")).await.unwrap();

        assert!(matches!(store.put("k", "v").await, Err(StoreError::Io(_))));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("offline_store_bad_{}.json", std::process::id()));
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = OfflineStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialize(_))));

        tokio::fs::remove_file(&path).await.unwrap_or_default();
    }
}
