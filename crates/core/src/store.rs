//! Keyed JSON record storage with two collections.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Videos,
    Frames,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Videos => "videos",
            Collection::Frames => "frames",
        }
    }
}

pub trait Store: Send + Sync {
    async fn put(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Records whose top-level `index` field equals `value`.
    async fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        let records = self.get_all(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.get(index) == Some(value))
            .collect())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError>;

    async fn clear(&self, collection: Collection) -> Result<(), StoreError>;
}

type Collections = HashMap<Collection, BTreeMap<String, Value>>;

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Collections) -> T) -> T {
        // Closures only insert or remove whole values, so a poisoned map is still consistent.
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut collections)
    }
}

impl Store for MemoryStore {
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        self.with(|c| {
            c.entry(collection)
                .or_default()
                .insert(key.to_string(), value.clone())
        });
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.with(|c| c.get(&collection).and_then(|records| records.get(key).cloned())))
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(self.with(|c| {
            c.get(&collection)
                .map(|records| records.values().cloned().collect())
                .unwrap_or_default()
        }))
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        self.with(|c| c.get_mut(&collection).and_then(|records| records.remove(key)));
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> Result<(), StoreError> {
        self.with(|c| c.remove(&collection));
        Ok(())
    }
}

/// One JSON file per record under `<root>/<collection>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.name())
    }

    fn record_path(&self, collection: Collection, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.collection_dir(collection).join(format!("{file_name}.json"))
    }
}

fn ignore_not_found(result: io::Result<()>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}

impl Store for FsStore {
    async fn put(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let path = self.record_path(collection, key);
        fs::create_dir_all(self.collection_dir(collection)).await?;

        // Write then rename so readers never see a half-written record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(collection = collection.name(), key, "record stored");
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        match fs::read(self.record_path(collection, key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let mut entries = match fs::read_dir(self.collection_dir(collection)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let bytes = fs::read(&path).await?;
                records.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(records)
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        ignore_not_found(fs::remove_file(self.record_path(collection, key)).await)
    }

    async fn clear(&self, collection: Collection) -> Result<(), StoreError> {
        ignore_not_found(fs::remove_dir_all(self.collection_dir(collection)).await)
    }
}
