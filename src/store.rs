//! Persistence for the lab's collections.
//!
//! Each collection is stored as one JSON document under a fixed key, mirroring how the data used to
//! live in browser storage. Backends only move strings around; (de)serialisation happens in
//! [`load_json`] and [`save_json`].

use std::{
    collections::HashMap,
    fmt::{self, Display},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{LabError, LabResult};

/// The documents the lab persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Timed records.
    Records,
    /// Queue definitions.
    Queues,
    /// Element counters per queue.
    Totals,
    /// Chronometer state, including pending clients.
    Pending,
    /// Saved services.
    Services,
}

impl Collection {
    /// All collections.
    pub const ALL: [Collection; 5] = [
        Collection::Records,
        Collection::Queues,
        Collection::Totals,
        Collection::Pending,
        Collection::Services,
    ];

    /// The storage key.
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Records => "queueing-data",
            Collection::Queues => "queueing-queues",
            Collection::Totals => "queueing-totals",
            Collection::Pending => "queueing-pending",
            Collection::Services => "queueing-services",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Somewhere to keep the lab's collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a collection. `None` if it was never written.
    async fn load(&self, collection: Collection) -> LabResult<Option<String>>;

    /// Replace a collection.
    async fn save(&self, collection: Collection, json: String) -> LabResult<()>;

    /// Remove a collection.
    async fn clear(&self, collection: Collection) -> LabResult<()>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    async fn load(&self, collection: Collection) -> LabResult<Option<String>> {
        (**self).load(collection).await
    }

    async fn save(&self, collection: Collection, json: String) -> LabResult<()> {
        (**self).save(collection, json).await
    }

    async fn clear(&self, collection: Collection) -> LabResult<()> {
        (**self).clear(collection).await
    }
}

/// Read and deserialise a collection, defaulting when absent.
pub async fn load_json<T, S>(store: &S, collection: Collection) -> LabResult<T>
where
    T: DeserializeOwned + Default,
    S: RecordStore + ?Sized,
{
    match store.load(collection).await? {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| LabError::json(collection.key(), e))
        }
        None => Ok(T::default()),
    }
}

/// Serialise and write a collection.
pub async fn save_json<T, S>(store: &S, collection: Collection, value: &T) -> LabResult<()>
where
    T: Serialize + ?Sized,
    S: RecordStore + ?Sized,
{
    let json = serde_json::to_string(value).map_err(|e| LabError::json(collection.key(), e))?;
    store.save(collection, json).await
}

/// Keeps everything in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<Collection, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, collection: Collection) -> LabResult<Option<String>> {
        Ok(self
            .documents
            .lock()
            .expect("should not panic while holding lock")
            .get(&collection)
            .cloned())
    }

    async fn save(&self, collection: Collection, json: String) -> LabResult<()> {
        self.documents
            .lock()
            .expect("should not panic while holding lock")
            .insert(collection, json);
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> LabResult<()> {
        self.documents
            .lock()
            .expect("should not panic while holding lock")
            .remove(&collection);
        Ok(())
    }
}

/// One `<key>.json` file per collection inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> LabResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "opened file store");
        Ok(Self { dir })
    }

    /// The data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.key()))
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load(&self, collection: Collection) -> LabResult<Option<String>> {
        match std::fs::read_to_string(self.path(collection)) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, collection: Collection, json: String) -> LabResult<()> {
        let target = self.path(collection);

        // Write next to the target and rename over it, so a crash never leaves half a document.
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(json.as_bytes())?;
        temp.flush()?;
        temp.persist(&target).map_err(|e| LabError::Io(e.error))?;

        debug!(collection = %collection, bytes = json.len(), "collection saved");
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> LabResult<()> {
        match std::fs::remove_file(self.path(collection)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(collection = %collection, "nothing to clear");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        let mut totals = BTreeMap::new();
        totals.insert("Caixa".to_string(), 3u64);

        save_json(&store, Collection::Totals, &totals).await.unwrap();
        let loaded: BTreeMap<String, u64> = load_json(&store, Collection::Totals).await.unwrap();

        assert_eq!(loaded, totals);
    }

    #[tokio::test]
    async fn missing_collection_loads_as_default() {
        let store = MemoryStore::new();
        let loaded: Vec<String> = load_json(&store, Collection::Queues).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            save_json(&store, Collection::Queues, &vec!["Caixa"]).await.unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let loaded: Vec<String> = load_json(&store, Collection::Queues).await.unwrap();
        assert_eq!(loaded, vec!["Caixa".to_string()]);
        assert!(dir.path().join("queueing-queues.json").exists());
    }

    #[tokio::test]
    async fn corrupt_collection_names_itself() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("queueing-data.json"), "{not json").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        let result: LabResult<Vec<String>> = load_json(&store, Collection::Records).await;

        assert_matches!(result, Err(LabError::Json { collection: "queueing-data", .. }));
    }

    #[tokio::test]
    async fn clearing_twice_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        save_json(&store, Collection::Services, &Vec::<String>::new()).await.unwrap();

        store.clear(Collection::Services).await.unwrap();
        store.clear(Collection::Services).await.unwrap();
        assert_eq!(store.load(Collection::Services).await.unwrap(), None);
    }
}
