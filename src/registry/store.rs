use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::types::{ChannelId, GroupName, SubjectId};

/// Durable registry contents: the two documents the service owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryContents {
    /// Group name -> ordered channel list.
    pub groups: IndexMap<GroupName, Vec<ChannelId>>,
    /// Subjects exempt from remove sweeps.
    pub authorized: BTreeSet<SubjectId>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence seam for the registry.
///
/// The [`Registry`](crate::registry::Registry) loads once at startup and
/// saves after every mutation; stores only ever see whole documents.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn load(&self) -> Result<RegistryContents, StoreError>;
    async fn save(&self, contents: &RegistryContents) -> Result<(), StoreError>;
}

/// JSON file store, one document per file.
pub struct JsonFileStore {
    groups_path: PathBuf,
    authorized_path: PathBuf,
}

impl JsonFileStore {
    pub const GROUPS_FILE: &'static str = "channel_groups.json";
    pub const AUTHORIZED_FILE: &'static str = "authorized_users.json";

    pub fn new(groups_path: impl Into<PathBuf>, authorized_path: impl Into<PathBuf>) -> Self {
        Self {
            groups_path: groups_path.into(),
            authorized_path: authorized_path.into(),
        }
    }

    /// Store rooted in `dir` with the conventional file names.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(Self::GROUPS_FILE), dir.join(Self::AUTHORIZED_FILE))
    }

    async fn read_or_default<T: Default + for<'de> Deserialize<'de>>(
        path: &Path,
    ) -> Result<T, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "registry file missing, starting empty");
                Ok(T::default())
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<RegistryContents, StoreError> {
        let groups = Self::read_or_default(&self.groups_path).await?;
        let authorized = Self::read_or_default(&self.authorized_path).await?;
        Ok(RegistryContents { groups, authorized })
    }

    async fn save(&self, contents: &RegistryContents) -> Result<(), StoreError> {
        let groups = serde_json::to_vec_pretty(&contents.groups)?;
        tokio::fs::write(&self.groups_path, groups).await?;
        let authorized = serde_json::to_vec_pretty(&contents.authorized)?;
        tokio::fs::write(&self.authorized_path, authorized).await?;
        Ok(())
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct InMemoryStore {
    contents: Mutex<RegistryContents>,
    saves: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: RegistryContents) -> Self {
        Self {
            contents: Mutex::new(contents),
            saves: AtomicUsize::new(0),
        }
    }

    /// How many times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn load(&self) -> Result<RegistryContents, StoreError> {
        Ok(self.contents.lock().unwrap().clone())
    }

    async fn save(&self, contents: &RegistryContents) -> Result<(), StoreError> {
        *self.contents.lock().unwrap() = contents.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contents() -> RegistryContents {
        let mut groups = IndexMap::new();
        groups.insert(
            GroupName::new("vip"),
            vec![ChannelId(-100), ChannelId(-200)],
        );
        groups.insert(GroupName::new("news"), vec![ChannelId(-300)]);
        RegistryContents {
            groups,
            authorized: BTreeSet::from([SubjectId(1), SubjectId(2)]),
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryStore::new();
        assert_eq!(store.load().await.unwrap(), RegistryContents::default());

        let contents = sample_contents();
        store.save(&contents).await.unwrap();
        assert_eq!(store.load().await.unwrap(), contents);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());

        let contents = sample_contents();
        store.save(&contents).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, contents);

        // Group order must survive the round trip.
        let names: Vec<&str> = loaded.groups.keys().map(|g| g.as_str()).collect();
        assert_eq!(names, vec!["vip", "news"]);
    }

    #[tokio::test]
    async fn test_json_store_writes_conventional_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        store.save(&sample_contents()).await.unwrap();

        let groups_raw =
            std::fs::read_to_string(dir.path().join(JsonFileStore::GROUPS_FILE)).unwrap();
        assert!(groups_raw.contains("\"vip\""));
        assert!(groups_raw.contains("-100"));

        let authorized_raw =
            std::fs::read_to_string(dir.path().join(JsonFileStore::AUTHORIZED_FILE)).unwrap();
        let parsed: Vec<i64> = serde_json::from_str(&authorized_raw).unwrap();
        assert_eq!(parsed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_json_store_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        assert_eq!(store.load().await.unwrap(), RegistryContents::default());
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(JsonFileStore::GROUPS_FILE), b"not json").unwrap();
        let store = JsonFileStore::in_dir(dir.path());

        match store.load().await {
            Err(StoreError::Serialization(_)) => {}
            other => panic!("expected serialization error, got {:?}", other.map(|_| ())),
        }
    }
}
