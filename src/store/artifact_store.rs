//! Versioned artifact store
//!
//! The store owns the authoritative id -> artifact map, the id -> history
//! lookup and the domain/type secondary indexes. Every mutation runs under
//! a single store-wide write lock and follows the same sequence:
//!
//! ```text
//! lock ─► read current ─► change ─► persist ─► swap record + index entries ─► unlock
//! ```
//!
//! A failed persistence write leaves memory and index untouched. Reads take
//! no exclusive lock.

use super::backend::{decode_history, encode_current, encode_history, ArtifactRecord, MemoryBackend, PersistenceBackend};
use crate::artifact::{Artifact, ArtifactStatus, ArtifactSummary, KnowledgeType, Version, VersionBump};
use crate::error::{Error, Result};
use crate::index::{Indexer, SearchCandidate};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Extension key remembering the status an archived artifact had
pub const ARCHIVED_FROM_KEY: &str = "archived_from";

/// Aggregate counts over the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_domain: BTreeMap<String, usize>,
    /// Prior versions held across all histories
    pub history_versions: usize,
}

#[derive(Default)]
struct StoreState {
    artifacts: HashMap<Uuid, Artifact>,
    histories: HashMap<Uuid, Vec<Artifact>>,
    by_domain: HashMap<String, HashSet<Uuid>>,
    by_type: HashMap<KnowledgeType, HashSet<Uuid>>,
}

impl StoreState {
    fn insert(&mut self, artifact: Artifact) {
        if let Some(previous) = self.artifacts.get(&artifact.id).cloned() {
            self.unlink(&previous);
        }
        self.by_domain
            .entry(artifact.metadata.domain.to_lowercase())
            .or_default()
            .insert(artifact.id);
        self.by_type
            .entry(artifact.knowledge_type)
            .or_default()
            .insert(artifact.id);
        self.artifacts.insert(artifact.id, artifact);
    }

    fn unlink(&mut self, artifact: &Artifact) {
        let domain = artifact.metadata.domain.to_lowercase();
        if let Some(ids) = self.by_domain.get_mut(&domain) {
            ids.remove(&artifact.id);
            if ids.is_empty() {
                self.by_domain.remove(&domain);
            }
        }
        if let Some(ids) = self.by_type.get_mut(&artifact.knowledge_type) {
            ids.remove(&artifact.id);
            if ids.is_empty() {
                self.by_type.remove(&artifact.knowledge_type);
            }
        }
    }

    fn remove(&mut self, id: &Uuid) -> Option<Artifact> {
        let artifact = self.artifacts.remove(id)?;
        self.unlink(&artifact);
        self.histories.remove(id);
        Some(artifact)
    }

    /// Oldest artifact whose trimmed title matches case-insensitively
    fn by_title(&self, title: &str) -> Option<&Artifact> {
        let wanted = title.trim().to_lowercase();
        self.artifacts
            .values()
            .filter(|a| a.title.trim().to_lowercase() == wanted)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
    }

    fn collect<'a, I>(&self, ids: I, include_archived: bool, limit: Option<usize>) -> Vec<Artifact>
    where
        I: IntoIterator<Item = &'a Uuid>,
    {
        let mut artifacts: Vec<Artifact> = ids
            .into_iter()
            .filter_map(|id| self.artifacts.get(id))
            .filter(|a| include_archived || a.status != ArtifactStatus::Archived)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            artifacts.truncate(limit);
        }
        artifacts
    }
}

fn not_found(id: &Uuid) -> Error {
    Error::NotFound(format!("artifact {}", id))
}

fn undecodable(id: Uuid, part: &str, e: Error) -> Error {
    tracing::error!(artifact_id = %id, "Undecodable artifact {}: {}", part, e);
    Error::Integrity {
        id: id.to_string(),
        reason: format!("undecodable {}: {}", part, e),
    }
}

/// Thread-safe, versioned artifact store
pub struct ArtifactStore {
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
    indexer: Arc<Indexer>,
    backend: Arc<dyn PersistenceBackend>,
}

impl ArtifactStore {
    /// Create an empty store over `backend`, indexing into `indexer`
    pub fn new(backend: Arc<dyn PersistenceBackend>, indexer: Arc<Indexer>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            write_lock: Mutex::new(()),
            indexer,
            backend,
        }
    }

    /// Store backed by memory only, with a default indexer
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), Arc::new(Indexer::default()))
    }

    /// Load every record from `backend`, verifying each checksum.
    ///
    /// An undecodable record or a checksum mismatch (current or any prior
    /// version) aborts loading with `Error::Integrity`. History entries that
    /// are not older than the current version are left over from an
    /// interrupted update and dropped.
    pub async fn open(backend: Arc<dyn PersistenceBackend>, indexer: Arc<Indexer>) -> Result<Self> {
        let store = Self::new(backend, indexer);
        let ids = store.backend.list_ids().await?;

        let mut state = StoreState::default();
        for id in ids {
            let Some(bytes) = store.backend.read(id).await? else {
                continue;
            };
            let ArtifactRecord { artifact, mut history } = ArtifactRecord::from_bytes(&bytes)
                .map_err(|e| undecodable(id, "record", e))?;
            if artifact.id != id {
                tracing::error!(artifact_id = %id, stored_id = %artifact.id, "Record id mismatch");
                return Err(Error::Integrity {
                    id: id.to_string(),
                    reason: format!("record holds artifact {}", artifact.id),
                });
            }
            if history.is_empty() {
                if let Some(bytes) = store.backend.read_history(id).await? {
                    history = decode_history(&bytes).map_err(|e| undecodable(id, "history", e))?;
                }
            }

            let current = artifact.version.as_tuple();
            let stored = history.len();
            history.retain(|h| h.version.as_tuple() < current);
            if history.len() < stored {
                tracing::warn!(
                    artifact_id = %id,
                    dropped = stored - history.len(),
                    "Dropped history entries from an interrupted update"
                );
            }

            for version in history.iter().chain(std::iter::once(&artifact)) {
                if let Err(e) = version.verify_checksum() {
                    tracing::error!(artifact_id = %id, version = %version.version, "Integrity check failed: {}", e);
                    return Err(e);
                }
            }

            store.indexer.index_artifact(&artifact).await;
            if !history.is_empty() {
                state.histories.insert(id, history);
            }
            state.insert(artifact);
        }

        tracing::info!(
            backend = store.backend.name(),
            artifacts = state.artifacts.len(),
            "Artifact store loaded"
        );
        *store.state.write().await = state;
        Ok(store)
    }

    /// The indexer kept in sync with this store
    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    async fn persist_current(&self, artifact: &Artifact) -> Result<()> {
        self.backend.write(artifact.id, encode_current(artifact)?).await
    }

    async fn persist_history(&self, id: Uuid, history: &[Artifact]) -> Result<()> {
        self.backend.write_history(id, encode_history(history)?).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new artifact as-is. Fails with `DuplicateId` if the id exists.
    /// Missing checksum and keywords are derived first.
    pub async fn store(&self, artifact: Artifact) -> Result<Uuid> {
        let _guard = self.write_lock.lock().await;
        self.insert_locked(artifact).await
    }

    /// Insert like `store`, but fail with `DuplicateTitle` when an artifact
    /// with the same title (trimmed, case-insensitive) already exists. The
    /// title check and the insert happen in one critical section.
    pub async fn store_unique(&self, artifact: Artifact) -> Result<Uuid> {
        let _guard = self.write_lock.lock().await;
        let existing = self.state.read().await.by_title(&artifact.title).map(|a| a.id);
        if let Some(existing) = existing {
            return Err(Error::DuplicateTitle {
                title: artifact.title,
                existing,
            });
        }
        self.insert_locked(artifact).await
    }

    /// Caller holds `write_lock`
    async fn insert_locked(&self, mut artifact: Artifact) -> Result<Uuid> {
        if self.state.read().await.artifacts.contains_key(&artifact.id) {
            return Err(Error::DuplicateId(artifact.id));
        }

        artifact.ensure_derived();
        artifact.verify_checksum()?;
        self.persist_current(&artifact).await?;

        let id = artifact.id;
        let mut state = self.state.write().await;
        self.indexer.index_artifact(&artifact).await;
        tracing::info!(artifact_id = %id, title = %artifact.title, "Stored artifact");
        state.insert(artifact);
        Ok(id)
    }

    /// Replace an existing artifact with a new revision.
    ///
    /// The stored revision is snapshotted into history, the version advances
    /// by `bump`, and checksum and keywords are recomputed. The contribution
    /// log of `artifact` must extend the stored one.
    pub async fn update(
        &self,
        artifact: Artifact,
        bump: VersionBump,
        contributor: &str,
        changelog: &str,
    ) -> Result<Artifact> {
        let id = artifact.id;
        self.update_with(&id, bump, contributor, move |current| {
            *current = artifact;
            Ok(changelog.to_string())
        })
        .await
    }

    /// Cut a new revision by editing the stored artifact in place.
    ///
    /// `change` runs on a copy of the current revision while the write lock
    /// is held, so nothing committed concurrently is overwritten. It returns
    /// the changelog for the new version; an error aborts the update.
    pub async fn update_with<F>(
        &self,
        id: &Uuid,
        bump: VersionBump,
        contributor: &str,
        change: F,
    ) -> Result<Artifact>
    where
        F: FnOnce(&mut Artifact) -> Result<String>,
    {
        let _guard = self.write_lock.lock().await;
        let (previous, mut history) = {
            let state = self.state.read().await;
            let previous = state.artifacts.get(id).cloned().ok_or_else(|| not_found(id))?;
            let history = state.histories.get(id).cloned().unwrap_or_default();
            (previous, history)
        };

        let mut artifact = previous.clone();
        let changelog = change(&mut artifact)?;
        if artifact.id != previous.id {
            return Err(Error::InvalidArtifact("artifact id cannot change".to_string()));
        }
        if !artifact.log_extends(&previous) {
            return Err(Error::InvalidArtifact(
                "contribution log entries cannot be rewritten".to_string(),
            ));
        }

        artifact.version = previous.version.next(bump, changelog, contributor);
        artifact.created_at = previous.created_at;
        artifact.updated_at = Utc::now();
        artifact.refresh_derived();
        history.push(previous);

        // History first: a failure between the two writes leaves a trailing
        // entry that `open` drops.
        self.persist_history(artifact.id, &history).await?;
        self.persist_current(&artifact).await?;

        let mut state = self.state.write().await;
        self.indexer.index_artifact(&artifact).await;
        tracing::info!(
            artifact_id = %artifact.id,
            version = %artifact.version,
            contributor,
            "Updated artifact"
        );
        state.histories.insert(artifact.id, history);
        state.insert(artifact.clone());
        Ok(artifact)
    }

    /// Archive (`hard = false`) or permanently remove (`hard = true`) an
    /// artifact. Returns false if the id is unknown.
    pub async fn delete(&self, id: &Uuid, hard: bool) -> Result<bool> {
        if !hard {
            return match self
                .modify(id, |artifact| {
                    if artifact.status != ArtifactStatus::Archived {
                        artifact.metadata.extensions.insert(
                            ARCHIVED_FROM_KEY.to_string(),
                            serde_json::json!(artifact.status),
                        );
                        artifact.status = ArtifactStatus::Archived;
                    }
                })
                .await
            {
                Ok(_) => {
                    tracing::info!(artifact_id = %id, "Archived artifact");
                    Ok(true)
                }
                Err(Error::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            };
        }

        let _guard = self.write_lock.lock().await;
        if !self.state.read().await.artifacts.contains_key(id) {
            return Ok(false);
        }
        self.backend.delete(*id).await?;

        let mut state = self.state.write().await;
        self.indexer.remove_artifact(id).await;
        state.remove(id);
        tracing::info!(artifact_id = %id, "Permanently deleted artifact");
        Ok(true)
    }

    /// Apply a metadata or status change that leaves the version untouched.
    /// Only the current record is rewritten.
    async fn modify<F>(&self, id: &Uuid, change: F) -> Result<Artifact>
    where
        F: FnOnce(&mut Artifact),
    {
        let _guard = self.write_lock.lock().await;
        let mut artifact = self
            .state
            .read()
            .await
            .artifacts
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))?;

        change(&mut artifact);
        artifact.updated_at = Utc::now();
        self.persist_current(&artifact).await?;

        self.state.write().await.insert(artifact.clone());
        Ok(artifact)
    }

    /// Increment the usage counter. Returns false if the id is unknown.
    pub async fn record_usage(&self, id: &Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut artifact) = self.state.read().await.artifacts.get(id).cloned() else {
            return Ok(false);
        };

        // Usage does not count as a modification for recency purposes.
        artifact.metadata.usage_count += 1;
        self.persist_current(&artifact).await?;

        if let Some(stored) = self.state.write().await.artifacts.get_mut(id) {
            stored.metadata.usage_count = artifact.metadata.usage_count;
        }
        Ok(true)
    }

    /// Mark an artifact approved
    pub async fn approve(&self, id: &Uuid) -> Result<Artifact> {
        let artifact = self
            .modify(id, |a| a.status = ArtifactStatus::Approved)
            .await?;
        tracing::info!(artifact_id = %id, "Approved artifact");
        Ok(artifact)
    }

    /// Mark an artifact deprecated
    pub async fn deprecate(&self, id: &Uuid) -> Result<Artifact> {
        let artifact = self
            .modify(id, |a| a.status = ArtifactStatus::Deprecated)
            .await?;
        tracing::info!(artifact_id = %id, "Deprecated artifact");
        Ok(artifact)
    }

    /// Undo a soft delete, returning the artifact to the status it had
    /// before archiving. Non-archived artifacts are returned unchanged.
    pub async fn restore(&self, id: &Uuid) -> Result<Artifact> {
        let artifact = self
            .modify(id, |a| {
                if a.status != ArtifactStatus::Archived {
                    return;
                }
                a.status = a
                    .metadata
                    .extensions
                    .remove(ARCHIVED_FROM_KEY)
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
            })
            .await?;
        tracing::info!(artifact_id = %id, status = %artifact.status, "Restored artifact");
        Ok(artifact)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &Uuid) -> Option<Artifact> {
        self.state.read().await.artifacts.get(id).cloned()
    }

    /// Case-insensitive exact title lookup.
    ///
    /// Linear scan over every artifact; the oldest match wins.
    pub async fn get_by_title(&self, title: &str) -> Option<Artifact> {
        self.state.read().await.by_title(title).cloned()
    }

    /// Index candidates paired with the records they were scored against.
    ///
    /// The store read guard is held across the index lookup. Writers swap a
    /// record and its index entries under the write guard, so every pair
    /// reflects the same revision.
    pub async fn search_records(
        &self,
        query: &str,
        domain: Option<&str>,
        types: &[KnowledgeType],
        limit: usize,
    ) -> Vec<(SearchCandidate, Artifact)> {
        let state = self.state.read().await;
        self.indexer
            .search(query, domain, types, limit)
            .await
            .into_iter()
            .filter_map(|candidate| {
                let artifact = state.artifacts.get(&candidate.artifact_id)?.clone();
                Some((candidate, artifact))
            })
            .collect()
    }

    /// A specific version of an artifact, current or historical
    pub async fn get_version(&self, id: &Uuid, version: &str) -> Option<Artifact> {
        let state = self.state.read().await;
        let current = state.artifacts.get(id)?;
        if current.version.matches(version) {
            return Some(current.clone());
        }
        state
            .histories
            .get(id)?
            .iter()
            .find(|a| a.version.matches(version))
            .cloned()
    }

    /// Every version of an artifact, oldest first. Empty for unknown ids.
    pub async fn list_versions(&self, id: &Uuid) -> Vec<Version> {
        let state = self.state.read().await;
        let Some(current) = state.artifacts.get(id) else {
            return Vec::new();
        };
        state
            .histories
            .get(id)
            .into_iter()
            .flatten()
            .chain(std::iter::once(current))
            .map(|a| a.version.clone())
            .collect()
    }

    /// Artifacts in `domain` (case-insensitive), most recently updated first
    pub async fn list_by_domain(&self, domain: &str, include_archived: bool, limit: Option<usize>) -> Vec<Artifact> {
        let state = self.state.read().await;
        state.collect(
            state.by_domain.get(&domain.to_lowercase()).into_iter().flatten(),
            include_archived,
            limit,
        )
    }

    /// Artifacts of `knowledge_type`, most recently updated first
    pub async fn list_by_type(
        &self,
        knowledge_type: KnowledgeType,
        include_archived: bool,
        limit: Option<usize>,
    ) -> Vec<Artifact> {
        let state = self.state.read().await;
        state.collect(
            state.by_type.get(&knowledge_type).into_iter().flatten(),
            include_archived,
            limit,
        )
    }

    /// All artifacts, most recently updated first
    pub async fn list_all(&self, include_archived: bool, limit: Option<usize>) -> Vec<Artifact> {
        let state = self.state.read().await;
        state.collect(state.artifacts.keys(), include_archived, limit)
    }

    /// Listing summaries, same ordering as `list_all`
    pub async fn list_summaries(&self, include_archived: bool, limit: Option<usize>) -> Vec<ArtifactSummary> {
        self.list_all(include_archived, limit)
            .await
            .iter()
            .map(Artifact::summary)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.artifacts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        let mut stats = StoreStats {
            total: state.artifacts.len(),
            history_versions: state.histories.values().map(Vec::len).sum(),
            ..Default::default()
        };
        for artifact in state.artifacts.values() {
            *stats.by_status.entry(artifact.status.to_string()).or_insert(0) += 1;
            *stats
                .by_type
                .entry(artifact.knowledge_type.to_string())
                .or_insert(0) += 1;
            *stats
                .by_domain
                .entry(artifact.metadata.domain.to_lowercase())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Re-check every in-memory checksum. Returns the ids that fail.
    pub async fn verify_integrity(&self) -> Vec<Uuid> {
        let state = self.state.read().await;
        let mut corrupted: Vec<Uuid> = state
            .artifacts
            .values()
            .filter(|artifact| {
                let history = state.histories.get(&artifact.id).into_iter().flatten();
                history
                    .chain(std::iter::once(*artifact))
                    .any(|a| a.verify_checksum().is_err())
            })
            .map(|a| a.id)
            .collect();
        corrupted.sort();
        for id in &corrupted {
            tracing::error!(artifact_id = %id, "Integrity check failed");
        }
        corrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{
        ArtifactBuilder, ContributionAction, ContributionRecord, ContributorType,
    };
    use crate::store::FileBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn artifact(title: &str, domain: &str, knowledge_type: KnowledgeType) -> Artifact {
        ArtifactBuilder::new(knowledge_type)
            .title(title)
            .content(format!("{} explained in enough words to be useful.", title))
            .domain(domain)
            .build()
            .unwrap()
    }

    fn record(contributor: &str) -> ContributionRecord {
        ContributionRecord {
            contributor_id: contributor.to_string(),
            contributor_type: ContributorType::Human,
            action: ContributionAction::Update,
            reason: "edit".to_string(),
            timestamp: Utc::now(),
            approved: true,
            auto_approved: false,
            approved_by: Some("reviewer".to_string()),
            proposal_id: None,
        }
    }

    #[tokio::test]
    async fn test_store_and_get_round_trip() {
        let store = ArtifactStore::in_memory();
        let a = artifact("TLS Handshake", "security", KnowledgeType::Concept);
        let id = store.store(a.clone()).await.unwrap();

        assert_eq!(id, a.id);
        assert_eq!(store.get(&id).await.unwrap(), a);
        assert!(store.indexer().is_indexed(&id).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_derives_missing_fields() {
        let store = ArtifactStore::in_memory();
        let mut a = artifact("Cache stampede", "performance", KnowledgeType::Experience);
        a.version.checksum.clear();
        a.keywords.clear();
        let id = store.store(a).await.unwrap();

        let stored = store.get(&id).await.unwrap();
        assert!(stored.verify_checksum().is_ok());
        assert!(stored.keywords.contains(&"stampede".to_string()));
    }

    #[tokio::test]
    async fn test_store_duplicate_id() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Idempotency keys", "api", KnowledgeType::Pattern);
        store.store(a.clone()).await.unwrap();
        let err = store.store(a.clone()).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == a.id));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_keeps_history() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Retry budgets", "reliability", KnowledgeType::Pattern);
        let id = store.store(a.clone()).await.unwrap();

        let mut next = a.clone();
        next.content = "Cap retries at ten percent of requests to avoid storms.".to_string();
        let updated = store
            .update(next, VersionBump::Minor, "alice", "tighten guidance")
            .await
            .unwrap();
        assert_eq!(updated.version.to_string(), "1.1.0");
        assert_eq!(updated.version.parent_version.as_deref(), Some("1.0.0"));
        assert_eq!(updated.version.created_by, "alice");
        assert_eq!(updated.created_at, a.created_at);
        assert!(updated.verify_checksum().is_ok());

        let updated = store
            .update(updated, VersionBump::Major, "bob", "rewrite")
            .await
            .unwrap();
        assert_eq!(updated.version.to_string(), "2.0.0");

        let versions: Vec<String> = store
            .list_versions(&id)
            .await
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(versions, vec!["1.0.0", "1.1.0", "2.0.0"]);

        let original = store.get_version(&id, "1.0.0").await.unwrap();
        assert_eq!(original.content, a.content);
        assert!(store.get_version(&id, "3.0.0").await.is_none());
        assert!(store.get_version(&Uuid::new_v4(), "1.0.0").await.is_none());
    }

    #[tokio::test]
    async fn test_update_reindexes() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Connection pooling", "databases", KnowledgeType::Pattern);
        store.store(a.clone()).await.unwrap();

        let mut next = a.clone();
        next.content = "Reuse sockets through pgbouncer in transaction mode.".to_string();
        store
            .update(next, VersionBump::Patch, "carol", "")
            .await
            .unwrap();

        let indexer = store.indexer();
        assert_eq!(indexer.search("pgbouncer", None, &[], 5).await.len(), 1);
        assert!(indexer.search("explained", None, &[], 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Ghost", "general", KnowledgeType::Fact);
        let err = store
            .update(a, VersionBump::Patch, "alice", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_rewritten_log() {
        let store = ArtifactStore::in_memory();
        let mut a = artifact("Feature flags", "delivery", KnowledgeType::Pattern);
        a.record_contribution(record("alice"));
        store.store(a.clone()).await.unwrap();

        let mut stale = artifact("Feature flags", "delivery", KnowledgeType::Pattern);
        stale.id = a.id;
        stale.record_contribution(record("mallory"));
        let err = store
            .update(stale, VersionBump::Patch, "mallory", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArtifact(_)));

        let mut extended = a.clone();
        extended.record_contribution(record("bob"));
        let updated = store
            .update(extended, VersionBump::Patch, "bob", "")
            .await
            .unwrap();
        assert_eq!(updated.contributions().len(), 2);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Blue green deploys", "delivery", KnowledgeType::Procedure);
        let id = store.store(a).await.unwrap();
        store.approve(&id).await.unwrap();

        assert!(store.delete(&id, false).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().status, ArtifactStatus::Archived);
        assert!(store.list_all(false, None).await.is_empty());
        assert_eq!(store.list_all(true, None).await.len(), 1);

        let restored = store.restore(&id).await.unwrap();
        assert_eq!(restored.status, ArtifactStatus::Approved);
        assert!(!restored.metadata.extensions.contains_key(ARCHIVED_FROM_KEY));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_everything() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Canary analysis", "delivery", KnowledgeType::Procedure);
        let id = store.store(a.clone()).await.unwrap();
        store
            .update(a, VersionBump::Patch, "alice", "")
            .await
            .unwrap();

        assert!(store.delete(&id, true).await.unwrap());
        assert!(store.get(&id).await.is_none());
        assert!(store.list_versions(&id).await.is_empty());
        assert!(!store.indexer().is_indexed(&id).await);
        assert!(store.list_by_domain("delivery", true, None).await.is_empty());
        assert_eq!(store.stats().await.history_versions, 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_returns_false() {
        let store = ArtifactStore::in_memory();
        assert!(!store.delete(&Uuid::new_v4(), false).await.unwrap());
        assert!(!store.delete(&Uuid::new_v4(), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_by_title_case_insensitive() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Password Hashing", "security", KnowledgeType::Concept);
        store.store(a.clone()).await.unwrap();

        assert_eq!(store.get_by_title("password hashing").await.unwrap().id, a.id);
        assert_eq!(store.get_by_title(" PASSWORD HASHING ").await.unwrap().id, a.id);
        assert!(store.get_by_title("password").await.is_none());
    }

    #[tokio::test]
    async fn test_secondary_indexes_follow_updates() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Rate limiting", "api", KnowledgeType::Pattern);
        let b = artifact("Token buckets", "API", KnowledgeType::Concept);
        store.store(a.clone()).await.unwrap();
        store.store(b).await.unwrap();

        assert_eq!(store.list_by_domain("api", false, None).await.len(), 2);
        assert_eq!(store.list_by_type(KnowledgeType::Pattern, false, None).await.len(), 1);

        let mut moved = a.clone();
        moved.metadata.domain = "networking".to_string();
        moved.knowledge_type = KnowledgeType::Rule;
        store
            .update(moved, VersionBump::Minor, "alice", "reclassify")
            .await
            .unwrap();

        assert_eq!(store.list_by_domain("api", false, None).await.len(), 1);
        assert_eq!(store.list_by_domain("networking", false, None).await.len(), 1);
        assert!(store.list_by_type(KnowledgeType::Pattern, false, None).await.is_empty());
        assert_eq!(store.list_by_type(KnowledgeType::Rule, false, None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_usage() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Backpressure", "streaming", KnowledgeType::Concept);
        let id = store.store(a.clone()).await.unwrap();

        assert!(store.record_usage(&id).await.unwrap());
        assert!(store.record_usage(&id).await.unwrap());
        let used = store.get(&id).await.unwrap();
        assert_eq!(used.metadata.usage_count, 2);
        assert_eq!(used.version, a.version);
        assert!(!store.record_usage(&Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_all_limit_and_summaries() {
        let store = ArtifactStore::in_memory();
        for i in 0..4 {
            store
                .store(artifact(&format!("Note {}", i), "general", KnowledgeType::Fact))
                .await
                .unwrap();
        }
        assert_eq!(store.list_all(false, Some(2)).await.len(), 2);
        let summaries = store.list_summaries(true, None).await;
        assert_eq!(summaries.len(), 4);
        assert!(summaries.iter().all(|s| s.version == "1.0.0"));
    }

    #[tokio::test]
    async fn test_stats() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Sharding", "databases", KnowledgeType::Concept);
        let id = store.store(a.clone()).await.unwrap();
        store
            .store(artifact("Vacuum", "Databases", KnowledgeType::Procedure))
            .await
            .unwrap();
        store.deprecate(&id).await.unwrap();
        store.update(store.get(&id).await.unwrap(), VersionBump::Patch, "a", "").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_domain["databases"], 2);
        assert_eq!(stats.by_status["deprecated"], 1);
        assert_eq!(stats.by_status["draft"], 1);
        assert_eq!(stats.by_type["procedure"], 1);
        assert_eq!(stats.history_versions, 1);
    }

    #[tokio::test]
    async fn test_reopen_from_files() {
        let dir = TempDir::new().unwrap();
        let id = {
            let backend = Arc::new(FileBackend::new(dir.path()).await.unwrap());
            let store = ArtifactStore::new(backend, Arc::new(Indexer::default()));
            let a = artifact("Circuit breakers", "reliability", KnowledgeType::Pattern);
            let id = store.store(a.clone()).await.unwrap();
            store
                .update(a, VersionBump::Minor, "alice", "half-open state")
                .await
                .unwrap();
            id
        };

        let backend = Arc::new(FileBackend::new(dir.path()).await.unwrap());
        let store = ArtifactStore::open(backend, Arc::new(Indexer::default()))
            .await
            .unwrap();
        assert_eq!(store.get(&id).await.unwrap().version.to_string(), "1.1.0");
        assert_eq!(store.list_versions(&id).await.len(), 2);
        assert!(store.indexer().is_indexed(&id).await);
        assert!(store.verify_integrity().await.is_empty());
    }

    #[tokio::test]
    async fn test_open_detects_tampering() {
        let backend = Arc::new(MemoryBackend::new());
        let mut a = artifact("Least privilege", "security", KnowledgeType::Rule);
        a.content = "Grant everything to everyone.".to_string();
        let record = ArtifactRecord {
            artifact: a.clone(),
            history: Vec::new(),
        };
        backend.write(a.id, record.to_bytes().unwrap()).await.unwrap();

        let result = ArtifactStore::open(backend, Arc::new(Indexer::default())).await;
        assert!(matches!(result, Err(Error::Integrity { id, .. }) if id == a.id.to_string()));
    }

    #[tokio::test]
    async fn test_open_rejects_garbage() {
        let backend = Arc::new(MemoryBackend::new());
        let id = Uuid::new_v4();
        backend.write(id, b"not json".to_vec()).await.unwrap();
        let result = ArtifactStore::open(backend, Arc::new(Indexer::default())).await;
        assert!(matches!(result, Err(Error::Integrity { .. })));
    }

    struct FailingBackend;

    #[async_trait]
    impl PersistenceBackend for FailingBackend {
        async fn write(&self, _id: Uuid, _bytes: Vec<u8>) -> Result<()> {
            Err(Error::Persistence("disk full".to_string()))
        }
        async fn read(&self, _id: Uuid) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn write_history(&self, _id: Uuid, _bytes: Vec<u8>) -> Result<()> {
            Err(Error::Persistence("disk full".to_string()))
        }
        async fn read_history(&self, _id: Uuid) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn list_ids(&self) -> Result<Vec<Uuid>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _id: Uuid) -> Result<bool> {
            Ok(false)
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_state_untouched() {
        let store = ArtifactStore::new(Arc::new(FailingBackend), Arc::new(Indexer::default()));
        let a = artifact("Write ahead logs", "databases", KnowledgeType::Concept);
        let err = store.store(a.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.get(&a.id).await.is_none());
        assert!(!store.indexer().is_indexed(&a.id).await);
    }

    #[tokio::test]
    async fn test_list_by_domain_and_type_filters() {
        let store = ArtifactStore::in_memory();
        let mut ids = Vec::new();
        for i in 0..3 {
            let id = store
                .store(artifact(&format!("Timeout {}", i), "reliability", KnowledgeType::Rule))
                .await
                .unwrap();
            ids.push(id);
        }
        store.delete(&ids[0], false).await.unwrap();

        assert_eq!(store.list_by_domain("reliability", false, None).await.len(), 2);
        assert_eq!(store.list_by_domain("reliability", true, None).await.len(), 3);
        let newest = store.list_by_domain("Reliability", true, Some(1)).await;
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].id, ids[0]);

        assert_eq!(store.list_by_type(KnowledgeType::Rule, false, None).await.len(), 2);
        assert_eq!(store.list_by_type(KnowledgeType::Rule, true, Some(2)).await.len(), 2);
        assert!(store.list_by_type(KnowledgeType::Fact, true, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_unique_rejects_same_title() {
        let store = ArtifactStore::in_memory();
        let first = artifact("Nonce Reuse", "security", KnowledgeType::Rule);
        store.store_unique(first.clone()).await.unwrap();

        let again = artifact(" nonce reuse ", "security", KnowledgeType::Rule);
        let err = store.store_unique(again.clone()).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTitle { existing, .. } if existing == first.id));
        assert!(store.get(&again.id).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_with_keeps_concurrent_status_change() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Key rotation", "security", KnowledgeType::Procedure);
        let id = store.store(a).await.unwrap();
        store.record_usage(&id).await.unwrap();
        store.delete(&id, false).await.unwrap();

        let updated = store
            .update_with(&id, VersionBump::Patch, "alice", |current| {
                current.metadata.set_confidence(0.9);
                Ok("raise confidence".to_string())
            })
            .await
            .unwrap();
        assert_eq!(updated.status, ArtifactStatus::Archived);
        assert_eq!(updated.metadata.usage_count, 1);
        assert_eq!(updated.metadata.confidence(), 0.9);
        assert_eq!(updated.version.changelog, "raise confidence");
    }

    #[tokio::test]
    async fn test_update_with_error_changes_nothing() {
        let store = ArtifactStore::in_memory();
        let a = artifact("Audit logging", "security", KnowledgeType::Rule);
        let id = store.store(a.clone()).await.unwrap();

        let err = store
            .update_with(&id, VersionBump::Major, "alice", |current| {
                current.content = "changed".to_string();
                Err(Error::InvalidPatch("refused".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPatch(_)));
        assert_eq!(store.get(&id).await.unwrap(), a);
        assert_eq!(store.list_versions(&id).await.len(), 1);

        let err = store
            .update_with(&Uuid::new_v4(), VersionBump::Patch, "alice", |_| Ok(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        history_writes: AtomicUsize,
    }

    #[async_trait]
    impl PersistenceBackend for CountingBackend {
        async fn write(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
            self.inner.write(id, bytes).await
        }
        async fn read(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
            self.inner.read(id).await
        }
        async fn write_history(&self, id: Uuid, bytes: Vec<u8>) -> Result<()> {
            self.history_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write_history(id, bytes).await
        }
        async fn read_history(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
            self.inner.read_history(id).await
        }
        async fn list_ids(&self) -> Result<Vec<Uuid>> {
            self.inner.list_ids().await
        }
        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_usage_and_status_changes_skip_history_writes() {
        let backend = Arc::new(CountingBackend::default());
        let store = ArtifactStore::new(backend.clone(), Arc::new(Indexer::default()));
        let a = artifact("Bulkheads", "reliability", KnowledgeType::Pattern);
        let id = store.store(a.clone()).await.unwrap();
        store.update(a.clone(), VersionBump::Patch, "alice", "").await.unwrap();
        store
            .update(store.get(&id).await.unwrap(), VersionBump::Patch, "bob", "")
            .await
            .unwrap();
        assert_eq!(backend.history_writes.load(Ordering::SeqCst), 2);

        for _ in 0..5 {
            store.record_usage(&id).await.unwrap();
        }
        store.approve(&id).await.unwrap();
        store.delete(&id, false).await.unwrap();
        assert_eq!(backend.history_writes.load(Ordering::SeqCst), 2);

        let reopened = ArtifactStore::open(backend, Arc::new(Indexer::default()))
            .await
            .unwrap();
        let loaded = reopened.get(&id).await.unwrap();
        assert_eq!(loaded.metadata.usage_count, 5);
        assert_eq!(loaded.status, ArtifactStatus::Archived);
        assert_eq!(reopened.list_versions(&id).await.len(), 3);
    }

    #[tokio::test]
    async fn test_open_drops_history_left_by_interrupted_update() {
        let backend = Arc::new(MemoryBackend::new());
        let a = artifact("Dead letter queues", "messaging", KnowledgeType::Pattern);
        backend.write(a.id, encode_current(&a).unwrap()).await.unwrap();
        backend
            .write_history(a.id, encode_history(&[a.clone()]).unwrap())
            .await
            .unwrap();

        let store = ArtifactStore::open(backend, Arc::new(Indexer::default()))
            .await
            .unwrap();
        assert_eq!(store.list_versions(&a.id).await.len(), 1);
        assert_eq!(store.stats().await.history_versions, 0);
    }

    #[tokio::test]
    async fn test_open_detects_tampered_history() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ArtifactStore::new(backend.clone(), Arc::new(Indexer::default()));
        let a = artifact("Mutual TLS", "security", KnowledgeType::Rule);
        let id = store.store(a.clone()).await.unwrap();
        store.update(a.clone(), VersionBump::Minor, "alice", "").await.unwrap();

        let mut forged = a;
        forged.content = "Plaintext is fine inside the cluster.".to_string();
        backend
            .write_history(id, encode_history(&[forged]).unwrap())
            .await
            .unwrap();

        let result = ArtifactStore::open(backend, Arc::new(Indexer::default())).await;
        assert!(matches!(result, Err(Error::Integrity { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_usage_and_revisions_lose_nothing() {
        let store = Arc::new(ArtifactStore::in_memory());
        let id = store
            .store(artifact("Nonce handling", "security", KnowledgeType::Rule))
            .await
            .unwrap();

        let usage = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    store.record_usage(&id).await.unwrap();
                }
            })
        };
        let revisions = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..40 {
                    store
                        .update_with(&id, VersionBump::Patch, "validator", |current| {
                            current.metadata.validation_count += 1;
                            Ok(format!("validation {}", i))
                        })
                        .await
                        .unwrap();
                }
            })
        };
        let archive = {
            let store = store.clone();
            tokio::spawn(async move { store.delete(&id, false).await.unwrap() })
        };
        usage.await.unwrap();
        revisions.await.unwrap();
        assert!(archive.await.unwrap());

        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.metadata.usage_count, 200);
        assert_eq!(stored.metadata.validation_count, 40);
        assert_eq!(stored.status, ArtifactStatus::Archived);
        assert_eq!(store.list_versions(&id).await.len(), 41);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_unique_admits_one_title() {
        let store = Arc::new(ArtifactStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .store_unique(artifact("Replay Windows", "security", KnowledgeType::Rule))
                        .await
                })
            })
            .collect();

        let mut stored = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => stored += 1,
                Err(Error::DuplicateTitle { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_search_records_match_their_candidates_under_writes() {
        let store = Arc::new(ArtifactStore::in_memory());
        let a = ArtifactBuilder::new(KnowledgeType::Concept)
            .title("Token flip")
            .content("alpha alpha alpha describes the first wording.")
            .build()
            .unwrap();
        let id = store.store(a).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    let wording = if i % 2 == 0 { "beta" } else { "alpha" };
                    store
                        .update_with(&id, VersionBump::Patch, "writer", |current| {
                            current.content = format!("{w} {w} {w} describes another wording.", w = wording);
                            Ok(String::new())
                        })
                        .await
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        for (candidate, record) in store.search_records("alpha", None, &[], 5).await {
                            assert_eq!(candidate.artifact_id, record.id);
                            assert!(record.content.contains("alpha"), "stale record: {}", record.content);
                        }
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
