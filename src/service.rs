//! Knowledge service assembly
//!
//! `KnowledgeService` wires one indexer, store, retriever and contributor
//! together from a `LoreVaultConfig`. Every component is constructed here
//! and owned by the service; there is no process-wide registry.

use crate::config::LoreVaultConfig;
use crate::error::Result;
use crate::governance::{Contributor, KnowledgeValidator};
use crate::index::{IndexStats, Indexer};
use crate::retrieval::Retriever;
use crate::store::{ArtifactStore, FileBackend, MemoryBackend, PersistenceBackend, StoreStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Combined counters across the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub store: StoreStats,
    pub index: IndexStats,
    pub pending_proposals: usize,
}

/// Store, index, retrieval and governance behind one handle
pub struct KnowledgeService {
    config: LoreVaultConfig,
    store: Arc<ArtifactStore>,
    retriever: Retriever,
    contributor: Contributor,
}

impl KnowledgeService {
    /// Validate `config`, pick the backend it names and load every record.
    pub async fn open(config: LoreVaultConfig) -> Result<Self> {
        config.validate()?;
        let backend: Arc<dyn PersistenceBackend> = match &config.storage.data_dir {
            Some(dir) => Arc::new(FileBackend::new(dir).await?),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::with_backend(config, backend).await
    }

    /// Assemble the service over an explicit persistence backend
    pub async fn with_backend(config: LoreVaultConfig, backend: Arc<dyn PersistenceBackend>) -> Result<Self> {
        config.validate()?;
        let indexer = Arc::new(Indexer::new(config.indexer.clone()));
        let store = Arc::new(ArtifactStore::open(backend, indexer).await?);
        let retriever = Retriever::new(store.clone(), config.retrieval.clone());
        let contributor = Contributor::new(store.clone(), config.governance.clone());

        tracing::info!(artifacts = store.len().await, "Knowledge service ready");
        Ok(Self {
            config,
            store,
            retriever,
            contributor,
        })
    }

    /// Ephemeral service with default configuration
    pub async fn in_memory() -> Result<Self> {
        Self::open(LoreVaultConfig::default()).await
    }

    /// Register a validation hook on the contributor
    pub fn with_validator(mut self, validator: Arc<dyn KnowledgeValidator>) -> Self {
        self.contributor = self.contributor.with_validator(validator);
        self
    }

    pub fn config(&self) -> &LoreVaultConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        self.store.indexer()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn contributor(&self) -> &Contributor {
        &self.contributor
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            store: self.store.stats().await,
            index: self.indexer().stats().await,
            pending_proposals: self.contributor.pending_count().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ContributorType, KnowledgeType};
    use crate::governance::{ContributorIdentity, KnowledgeSubmission, ProposalStatus};
    use crate::retrieval::RetrievalContext;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_service_end_to_end() {
        let service = KnowledgeService::in_memory().await.unwrap();
        let expert = ContributorIdentity::new("ops-lead", ContributorType::Expert);
        let proposal = service
            .contributor()
            .propose_knowledge(
                &expert,
                KnowledgeSubmission::new(
                    "Graceful shutdown",
                    "Drain connections before stopping the process on SIGTERM.",
                    KnowledgeType::Procedure,
                )
                .domain("operations"),
                "runbook",
            )
            .await
            .unwrap();
        assert_eq!(proposal.status, ProposalStatus::Merged);

        let results = service
            .retriever()
            .retrieve("shutdown", &RetrievalContext::new(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let stats = service.stats().await;
        assert_eq!(stats.store.total, 1);
        assert_eq!(stats.index.documents, 1);
        assert_eq!(stats.pending_proposals, 0);
    }

    #[tokio::test]
    async fn test_file_service_reloads() {
        let dir = TempDir::new().unwrap();
        let mut config = LoreVaultConfig::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());

        {
            let service = KnowledgeService::open(config.clone()).await.unwrap();
            let system = ContributorIdentity::new("importer", ContributorType::System);
            service
                .contributor()
                .propose_knowledge(
                    &system,
                    KnowledgeSubmission::new(
                        "Log rotation",
                        "Rotate logs daily and keep fourteen compressed generations.",
                        KnowledgeType::Rule,
                    ),
                    "",
                )
                .await
                .unwrap();
        }

        let service = KnowledgeService::open(config).await.unwrap();
        assert_eq!(service.store().len().await, 1);
        assert_eq!(service.indexer().search("rotation", None, &[], 5).await.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = LoreVaultConfig::default();
        config.retrieval.overfetch_factor = 0;
        assert!(KnowledgeService::open(config).await.is_err());
    }
}
