//! LoreVault configuration management

use crate::artifact::{ContributorType, MAX_KEYWORDS};
use crate::error::{Error, Result};
use crate::retrieval::ScoreWeights;
use crate::store::FileBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main LoreVault configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoreVaultConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Indexer configuration
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Governance configuration
    #[serde(default)]
    pub governance: GovernanceConfig,
}

impl LoreVaultConfig {
    /// Read a TOML configuration file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        self.indexer.validate()?;
        self.retrieval.validate()?;
        self.governance.validate()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON record per artifact.
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured data directory, or ~/.lorevault/artifacts/
    pub fn data_dir_or_default(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(FileBackend::default_dir)
    }
}

/// Indexer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Derived keywords indexed per artifact
    pub max_keywords: usize,

    /// Posting frequency assigned to derived keywords
    pub keyword_weight: u32,

    /// Posting frequency assigned to tags
    pub tag_weight: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_keywords: MAX_KEYWORDS,
            keyword_weight: 3,
            tag_weight: 5,
        }
    }
}

impl IndexerConfig {
    fn validate(&self) -> Result<()> {
        if self.max_keywords > MAX_KEYWORDS {
            return Err(Error::Config(format!(
                "indexer.max_keywords must be at most {}",
                MAX_KEYWORDS
            )));
        }
        if self.keyword_weight == 0 || self.tag_weight == 0 {
            return Err(Error::Config(
                "indexer keyword_weight and tag_weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index per requested result
    pub overfetch_factor: usize,

    /// Weight table applied when ranking
    pub weights: ScoreWeights,

    /// Highlighted sentences per result
    pub max_highlights: usize,

    /// Characters kept per highlighted sentence
    pub highlight_max_chars: usize,

    /// Minimum confidence for `retrieve_for_task`
    pub task_min_confidence: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 3,
            weights: ScoreWeights::default(),
            max_highlights: 3,
            highlight_max_chars: 200,
            task_min_confidence: 0.5,
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<()> {
        if self.overfetch_factor == 0 {
            return Err(Error::Config(
                "retrieval.overfetch_factor must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.task_min_confidence) {
            return Err(Error::Config(
                "retrieval.task_min_confidence must be within [0, 1]".to_string(),
            ));
        }
        self.weights.validate()
    }
}

/// Governance configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Confidence at or above which proposals merge without review
    pub auto_approve_threshold: f64,

    /// Contributor types whose proposals merge without review
    pub trusted_contributors: Vec<ContributorType>,

    /// Minimum content length in characters
    pub min_content_len: usize,

    /// Minimum title length in characters
    pub min_title_len: usize,

    /// Largest confidence change a single validation may apply
    pub max_validation_adjustment: f64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.9,
            trusted_contributors: vec![ContributorType::Expert, ContributorType::System],
            min_content_len: 20,
            min_title_len: 3,
            max_validation_adjustment: 0.2,
        }
    }
}

impl GovernanceConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_approve_threshold) {
            return Err(Error::Config(
                "governance.auto_approve_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_validation_adjustment) {
            return Err(Error::Config(
                "governance.max_validation_adjustment must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
