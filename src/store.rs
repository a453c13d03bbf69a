//! Guestbook entry storage
//!
//! The [`EntryStore`] trait mirrors a key-value table keyed by entry id:
//! single-item get/put/delete plus a full scan. Two backends exist:
//!
//! - [`InMemoryEntryStore`]: a `DashMap`, lost on restart
//! - [`FileEntryStore`]: the whole table as one JSON document on disk,
//!   rewritten atomically (temp file + rename) on every mutation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};
use crate::{Error, Result};

/// One signed guestbook message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Unique id (UUIDv4)
    pub entry_id: String,
    /// Author handle
    pub login: String,
    /// Author avatar URL
    pub avatar_url: String,
    /// Message text
    pub message: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Entry {
    /// New entry with a fresh id, stamped now
    pub fn new(
        login: impl Into<String>,
        avatar_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            login: login.into(),
            avatar_url: avatar_url.into(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether `handle` wrote this entry
    #[must_use]
    pub fn is_authored_by(&self, handle: &str) -> bool {
        self.login == handle
    }
}

/// Storage backend for entries
///
/// Operations are independent; there are no transactions.
#[async_trait]
pub trait EntryStore: Send + Sync + 'static {
    /// Insert or replace an entry
    async fn put(&self, entry: Entry) -> Result<()>;

    /// Look up an entry by id
    async fn get(&self, entry_id: &str) -> Result<Option<Entry>>;

    /// Delete an entry by id. Deleting a missing entry is not an error.
    async fn delete(&self, entry_id: &str) -> Result<()>;

    /// Every entry, in no particular order
    async fn scan(&self) -> Result<Vec<Entry>>;
}

/// All entries, newest first
pub async fn list_entries(store: &dyn EntryStore) -> Result<Vec<Entry>> {
    let mut entries = store.scan().await?;
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(entries)
}

/// Build the store described by configuration
pub async fn from_config(config: &StoreConfig) -> Result<Arc<dyn EntryStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory entry store");
            Ok(Arc::new(InMemoryEntryStore::new()))
        }
        StoreBackend::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| Error::Config("store.path is required for the file backend".into()))?;
            let store = FileEntryStore::open(path).await?;
            info!(path = %path, entries = store.len().await, "Using file entry store");
            Ok(Arc::new(store))
        }
    }
}

/// In-memory entry store
#[derive(Default)]
pub struct InMemoryEntryStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryEntryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn put(&self, entry: Entry) -> Result<()> {
        self.entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, entry_id: &str) -> Result<Option<Entry>> {
        Ok(self.entries.get(entry_id).map(|e| e.value().clone()))
    }

    async fn delete(&self, entry_id: &str) -> Result<()> {
        self.entries.remove(entry_id);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Entry>> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }
}

/// JSON-file entry store
pub struct FileEntryStore {
    path: PathBuf,
    entries: Mutex<Vec<Entry>>,
}

impl FileEntryStore {
    /// Open (or lazily create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::Store(format!("Corrupt entry file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Number of stored entries
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn persist(&self, entries: &[Entry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "Entry file written");
        Ok(())
    }
}

#[async_trait]
impl EntryStore for FileEntryStore {
    async fn put(&self, entry: Entry) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut next: Vec<Entry> = entries
            .iter()
            .filter(|e| e.entry_id != entry.entry_id)
            .cloned()
            .collect();
        next.push(entry);
        // Memory only changes once the file does
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn get(&self, entry_id: &str) -> Result<Option<Entry>> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.entry_id == entry_id).cloned())
    }

    async fn delete(&self, entry_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.iter().any(|e| e.entry_id == entry_id) {
            return Ok(());
        }
        let next: Vec<Entry> = entries
            .iter()
            .filter(|e| e.entry_id != entry_id)
            .cloned()
            .collect();
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Entry>> {
        Ok(self.entries.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_at(login: &str, message: &str, minutes_ago: i64) -> Entry {
        Entry {
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            ..Entry::new(login, format!("http://x/{login}.png"), message)
        }
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = Entry::new("alice", "http://x/a.png", "hi");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("entryId").is_some());
        assert!(json.get("avatarUrl").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["login"], "alice");
    }

    #[test]
    fn test_authorship() {
        let entry = Entry::new("alice", "http://x/a.png", "hi");
        assert!(entry.is_authored_by("alice"));
        assert!(!entry.is_authored_by("bob"));
        assert!(!entry.is_authored_by("Alice"));
    }

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = InMemoryEntryStore::new();
        let entry = Entry::new("alice", "http://x/a.png", "hello");
        let id = entry.entry_id.clone();

        store.put(entry.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(entry));
        assert_eq!(store.scan().await.unwrap().len(), 1);

        store.delete(&id).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), None);
        // Idempotent
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_entries_newest_first() {
        let store = InMemoryEntryStore::new();
        store.put(entry_at("alice", "oldest", 30)).await.unwrap();
        store.put(entry_at("bob", "newest", 1)).await.unwrap();
        store.put(entry_at("carol", "middle", 10)).await.unwrap();

        let messages: Vec<String> = list_entries(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, ["newest", "middle", "oldest"]);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entries.json");

        let store = FileEntryStore::open(&path).await.unwrap();
        assert_eq!(store.len().await, 0);
        let keep = Entry::new("alice", "http://x/a.png", "keep me");
        let drop_me = Entry::new("bob", "http://x/b.png", "delete me");
        store.put(keep.clone()).await.unwrap();
        store.put(drop_me.clone()).await.unwrap();
        store.delete(&drop_me.entry_id).await.unwrap();

        let reopened = FileEntryStore::open(&path).await.unwrap();
        assert_eq!(reopened.scan().await.unwrap(), vec![keep.clone()]);
        assert_eq!(reopened.get(&keep.entry_id).await.unwrap(), Some(keep));
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FileEntryStore::open(&path).await.err().unwrap();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.json");

        let store = FileEntryStore::open(&path).await.unwrap();
        let kept = Entry::new("alice", "http://x/a.png", "already here");
        store.put(kept.clone()).await.unwrap();

        // A directory where the temp file goes makes every write fail
        std::fs::create_dir(dir.path().join("entries.json.tmp")).unwrap();

        let rejected = Entry::new("bob", "http://x/b.png", "never saved");
        assert!(store.put(rejected.clone()).await.is_err());
        assert_eq!(store.get(&rejected.entry_id).await.unwrap(), None);
        assert_eq!(store.scan().await.unwrap(), vec![kept.clone()]);

        assert!(store.delete(&kept.entry_id).await.is_err());
        assert_eq!(store.get(&kept.entry_id).await.unwrap(), Some(kept.clone()));

        let on_disk = FileEntryStore::open(&path).await.unwrap();
        assert_eq!(on_disk.scan().await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn test_from_config_requires_path_for_file_backend() {
        let config = StoreConfig {
            backend: StoreBackend::File,
            path: None,
        };
        assert!(matches!(from_config(&config).await, Err(Error::Config(_))));
    }
}
