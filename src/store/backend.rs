//! Pluggable persistence backends
//!
//! The store persists each artifact as two payloads through the
//! `PersistenceBackend` trait: the current record, rewritten on every
//! change, and the prior-version history, rewritten only when a new
//! version is cut. Two implementations ship with the crate:
//!
//! ```text
//! MemoryBackend   id -> bytes maps, nothing touches disk
//! FileBackend     ~/.lorevault/artifacts/
//!                 ├── <uuid>.json
//!                 ├── <uuid>.history.json
//!                 └── ...
//! ```

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

const HISTORY_SUFFIX: &str = ".history";

/// An artifact together with its prior versions, oldest first.
///
/// The current-record payload normally carries an empty `history`; prior
/// versions live in the history payload. An inline history is still
/// accepted on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub artifact: Artifact,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Artifact>,
}

impl ArtifactRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Encode a current-record payload without copying any history
pub fn encode_current(artifact: &Artifact) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Current<'a> {
        artifact: &'a Artifact,
    }
    Ok(serde_json::to_vec_pretty(&Current { artifact })?)
}

pub fn encode_history(history: &[Artifact]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(history)?)
}

pub fn decode_history(bytes: &[u8]) -> Result<Vec<Artifact>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Storage collaborator used by `ArtifactStore`.
///
/// A single `write` or `write_history` must be atomic per id: readers
/// observe either the old bytes or the new bytes, never a partial payload.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Create or replace the current record for `id`
    async fn write(&self, id: Uuid, bytes: Vec<u8>) -> Result<()>;

    /// Read the current record for `id`, `None` if absent
    async fn read(&self, id: Uuid) -> Result<Option<Vec<u8>>>;

    /// Create or replace the version history for `id`
    async fn write_history(&self, id: Uuid, bytes: Vec<u8>) -> Result<()>;

    /// Read the version history for `id`, `None` if absent
    async fn read_history(&self, id: Uuid) -> Result<Option<Vec<u8>>>;

    /// Ids of every stored record
    async fn list_ids(&self) -> Result<Vec<Uuid>>;

    /// Remove the record and history for `id`. Returns false if no
    /// record existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Human-readable backend name (used in logs)
    fn name(&self) -> &str;
}

/// In-memory backend for tests and ephemeral stores
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<Uuid, Vec<u8>>>,
    histories: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    async fn write(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.records.write().await.insert(id, bytes);
        Ok(())
    }

    async fn read(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn write_history(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.histories.write().await.insert(id, bytes);
        Ok(())
    }

    async fn read_history(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.histories.read().await.get(&id).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.records.read().await.keys().copied().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.histories.write().await.remove(&id);
        Ok(self.records.write().await.remove(&id).is_some())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// One JSON file per artifact in a directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a backend rooted at `dir`
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Persistence(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Default data directory (~/.lorevault/artifacts/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lorevault")
            .join("artifacts")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn history_path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}{}.json", id, HISTORY_SUFFIX))
    }

    /// Write via a temp file and rename so readers never see a partial file
    async fn replace(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(Error::Persistence(format!("invalid path {}", path.display())));
        };
        let tmp = self.dir.join(format!(".{}.tmp", name));
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            Error::Persistence(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            Error::Persistence(format!("failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn write(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.replace(&self.path_for(id), &bytes).await
    }

    async fn read(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        read_optional(&self.path_for(id)).await
    }

    async fn write_history(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
        self.replace(&self.history_path_for(id), &bytes).await
    }

    async fn read_history(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        read_optional(&self.history_path_for(id)).await
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.ends_with(HISTORY_SUFFIX) {
                continue;
            }
            match Uuid::parse_str(stem) {
                Ok(id) => ids.push(id),
                Err(_) => {
                    tracing::warn!("Ignoring unexpected file {}", path.display());
                }
            }
        }
        Ok(ids)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        remove_optional(&self.history_path_for(id)).await?;
        remove_optional(&self.path_for(id)).await
    }

    fn name(&self) -> &str {
        "file"
    }
}
