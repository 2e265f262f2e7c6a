use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::StoreKind;
use crate::models::HasId;

pub const JOURNAL_KEY: &str = "journal:entries:v1";
pub const DOCTOR_CHAT_KEY: &str = "doctor-chat:messages:v1";
pub const COMMUNITY_POSTS_KEY: &str = "community:data:v1";
pub const COMMUNITY_USER_KEY: &str = "community:user:v1";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String-keyed blob store. Writes replace the whole value.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------- In-memory implementation ----------------
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.insert(key.to_string(), value.to_string());
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key);
        Ok(())
    }
}

// ---------------- File implementation (one JSON file per key) ----------------
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("failed to create data dir '{}': {e}", dir.display()))?;
        info!("File store rooted at '{}'", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        // tmp + rename: readers never see a partial blob
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, value).and_then(|_| std::fs::rename(&tmp, &path)) {
            error!("Failed to write '{}': {e}", path.display());
            return Err(e.into());
        }
        Ok(())
    }
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// Factory helper used in main
pub fn build_store(kind: &StoreKind) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::File(dir) => Ok(Arc::new(FileStore::open(dir.clone())?)),
    }
}

// ---------------- Collection adapter ----------------

/// A full list of entities serialized as one JSON array under one key.
///
/// `load` never fails: a missing key, a read error, or a payload that is not a
/// JSON array of `T` all load as an empty list. `save` overwrites the key with
/// the entire list; concurrent writers to the same key are last-write-wins.
pub struct PersistedCollection<T> {
    key: String,
    store: Arc<dyn KeyValueStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PersistedCollection<T> {
    fn clone(&self) -> Self {
        Self { key: self.key.clone(), store: self.store.clone(), _marker: PhantomData }
    }
}

impl<T> PersistedCollection<T>
where
    T: Serialize + DeserializeOwned + HasId,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { key: key.into(), store, _marker: PhantomData }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn load(&self) -> Vec<T> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, "failed to read collection: {e}. Starting empty.");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(key = %self.key, "malformed collection payload: {e}. Starting empty.");
                Vec::new()
            }
        }
    }

    pub fn save(&self, items: &[T]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(items)?;
        self.store.set(&self.key, &raw)
    }

    pub fn prepend(&self, item: T) -> Result<Vec<T>, StorageError> {
        let mut next = Vec::with_capacity(1);
        next.push(item);
        next.extend(self.load());
        self.save(&next)?;
        Ok(next)
    }

    pub fn append(&self, item: T) -> Result<Vec<T>, StorageError> {
        let mut next = self.load();
        next.push(item);
        self.save(&next)?;
        Ok(next)
    }

    /// Replace the element with the same id; other elements are untouched.
    pub fn update(&self, item: T) -> Result<Vec<T>, StorageError> {
        let mut next = self.load();
        if let Some(slot) = next.iter_mut().find(|e| e.id() == item.id()) {
            *slot = item;
        }
        self.save(&next)?;
        Ok(next)
    }

    pub fn remove(&self, id: &str) -> Result<Vec<T>, StorageError> {
        let next: Vec<T> = self.load().into_iter().filter(|e| e.id() != id).collect();
        self.save(&next)?;
        Ok(next)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.save(&[])
    }
}
