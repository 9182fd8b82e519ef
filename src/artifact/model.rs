//! Knowledge artifact data types
//!
//! An `Artifact` is one discrete, versioned unit of domain knowledge. It
//! carries a checksum over its core fields so corruption is detectable on
//! load, a derived keyword list used by the indexer, and an append-only
//! contribution log recording who changed it and why.

use super::version::Version;
use crate::error::{Error, Result};
use crate::index::tokenizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum number of derived keywords kept per artifact
pub const MAX_KEYWORDS: usize = 50;

/// A versioned knowledge artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique artifact identifier, immutable once assigned
    pub id: Uuid,
    /// Short title, also used for duplicate detection
    pub title: String,
    /// The knowledge itself
    pub content: String,
    /// Kind of knowledge this artifact represents
    pub knowledge_type: KnowledgeType,
    /// Lifecycle status
    pub status: ArtifactStatus,
    /// Domain, tags, confidence and usage tracking
    pub metadata: ArtifactMetadata,
    /// Current version record
    pub version: Version,
    /// Derived keywords (deduplicated, extraction order preserved)
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Optional embedding vector, carried but not used for ranking
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Related artifact ids (non-owning)
    #[serde(default)]
    pub related_ids: Vec<Uuid>,
    /// Parent artifact id (non-owning)
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Append-only contribution log
    #[serde(default)]
    contributions: Vec<ContributionRecord>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    /// Compute the integrity checksum over title, content and type.
    pub fn compute_checksum(title: &str, content: &str, knowledge_type: KnowledgeType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
        hasher.update(knowledge_type.as_str().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Checksum of the artifact's current core fields
    pub fn current_checksum(&self) -> String {
        Self::compute_checksum(&self.title, &self.content, self.knowledge_type)
    }

    /// Verify that the stored checksum matches the content.
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = self.current_checksum();
        if self.version.checksum != expected {
            return Err(Error::Integrity {
                id: self.id.to_string(),
                reason: format!(
                    "checksum mismatch at version {}: stored {}, computed {}",
                    self.version,
                    short(&self.version.checksum),
                    short(&expected)
                ),
            });
        }
        Ok(())
    }

    /// Extract up to `limit` keywords from title and content.
    pub fn extract_keywords(&self, limit: usize) -> Vec<String> {
        let text = format!("{} {}", self.title, self.content);
        tokenizer::extract_keywords(&text, limit)
    }

    /// Fill in checksum and keywords when they are missing.
    pub fn ensure_derived(&mut self) {
        if self.version.checksum.is_empty() {
            self.version.checksum = self.current_checksum();
        }
        if self.keywords.is_empty() {
            self.keywords = self.extract_keywords(MAX_KEYWORDS);
        }
    }

    /// Recompute checksum and keywords unconditionally.
    pub fn refresh_derived(&mut self) {
        self.version.checksum = self.current_checksum();
        self.keywords = self.extract_keywords(MAX_KEYWORDS);
    }

    /// The contribution log, oldest first
    pub fn contributions(&self) -> &[ContributionRecord] {
        &self.contributions
    }

    /// Append a record to the contribution log. Entries are never edited
    /// or removed afterwards.
    pub fn record_contribution(&mut self, record: ContributionRecord) {
        self.contributions.push(record);
    }

    /// Whether `self`'s contribution log extends `earlier`'s without
    /// rewriting any existing entry.
    pub fn log_extends(&self, earlier: &Artifact) -> bool {
        self.contributions.len() >= earlier.contributions.len()
            && self.contributions[..earlier.contributions.len()] == earlier.contributions[..]
    }

    /// Age in whole days since the last modification
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_days().max(0)
    }

    /// Listing summary for collaborators building an index/list API
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id,
            title: self.title.clone(),
            knowledge_type: self.knowledge_type,
            status: self.status,
            domain: self.metadata.domain.clone(),
            version: self.version.to_string(),
            usage_count: self.metadata.usage_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

/// The kind of knowledge an artifact represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    /// A reusable solution shape
    Pattern,
    /// A factual statement
    Fact,
    /// A worked example
    Example,
    /// Step-by-step instructions
    Procedure,
    /// An explanation of an idea
    Concept,
    /// A constraint that must hold
    Rule,
    /// A lesson learned in practice
    Experience,
    /// A fill-in skeleton
    Template,
    /// A pointer to external material
    Reference,
}

impl KnowledgeType {
    /// All knowledge types in declaration order
    pub const ALL: [KnowledgeType; 9] = [
        KnowledgeType::Pattern,
        KnowledgeType::Fact,
        KnowledgeType::Example,
        KnowledgeType::Procedure,
        KnowledgeType::Concept,
        KnowledgeType::Rule,
        KnowledgeType::Experience,
        KnowledgeType::Template,
        KnowledgeType::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Fact => "fact",
            Self::Example => "example",
            Self::Procedure => "procedure",
            Self::Concept => "concept",
            Self::Rule => "rule",
            Self::Experience => "experience",
            Self::Template => "template",
            Self::Reference => "reference",
        }
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for KnowledgeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown knowledge type '{}'", s))
    }
}

/// Lifecycle status of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    #[default]
    Draft,
    Reviewed,
    Approved,
    Deprecated,
    Archived,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Reviewed => "reviewed",
            Self::Approved => "approved",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Descriptive and usage metadata of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Knowledge domain, e.g. "security"
    pub domain: String,
    /// Optional finer-grained domain
    #[serde(default)]
    pub subdomain: Option<String>,
    /// Tag set
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Content language
    #[serde(default = "default_language")]
    pub language: String,
    /// Confidence in [0, 1]
    #[serde(default = "default_confidence", deserialize_with = "clamped_confidence")]
    confidence: f64,
    /// Where the knowledge came from
    #[serde(default)]
    pub source: Option<String>,
    /// Last time a contributor validated this artifact
    #[serde(default)]
    pub last_validated: Option<DateTime<Utc>>,
    /// Number of validations received
    #[serde(default)]
    pub validation_count: u32,
    /// Number of times this artifact was returned by retrieval
    #[serde(default)]
    pub usage_count: u64,
    /// Open extension map
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl ArtifactMetadata {
    /// Metadata for the given domain with default values elsewhere
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            subdomain: None,
            tags: BTreeSet::new(),
            language: default_language(),
            confidence: default_confidence(),
            source: None,
            last_validated: None,
            validation_count: 0,
            usage_count: 0,
            extensions: HashMap::new(),
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Set confidence, clamped to [0, 1]. Non-finite values become 0.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_unit(confidence);
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn clamped_confidence<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(clamp_unit(value))
}

/// Who is contributing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorType {
    Human,
    Agent,
    Expert,
    System,
}

impl ContributorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::Expert => "expert",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ContributorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContributorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "agent" => Ok(Self::Agent),
            "expert" => Ok(Self::Expert),
            "system" => Ok(Self::System),
            other => Err(format!("unknown contributor type '{}'", other)),
        }
    }
}

/// What a contribution did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionAction {
    Create,
    Update,
    Validate,
}

/// One entry of an artifact's contribution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub contributor_id: String,
    pub contributor_type: ContributorType,
    pub action: ContributionAction,
    /// Why the contribution was made
    #[serde(default)]
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the contribution was approved
    pub approved: bool,
    /// Whether approval happened without human review
    #[serde(default)]
    pub auto_approved: bool,
    /// Reviewer id, or "auto" for automatic approvals
    #[serde(default)]
    pub approved_by: Option<String>,
    /// Proposal that produced this contribution
    #[serde(default)]
    pub proposal_id: Option<Uuid>,
}

/// Compact listing view of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub title: String,
    pub knowledge_type: KnowledgeType,
    pub status: ArtifactStatus,
    pub domain: String,
    pub version: String,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Builder for constructing `Artifact` instances
pub struct ArtifactBuilder {
    id: Option<Uuid>,
    knowledge_type: KnowledgeType,
    title: Option<String>,
    content: Option<String>,
    status: ArtifactStatus,
    metadata: ArtifactMetadata,
    related_ids: Vec<Uuid>,
    parent_id: Option<Uuid>,
    embedding: Option<Vec<f32>>,
}

impl ArtifactBuilder {
    /// Create a new builder with the required knowledge type
    pub fn new(knowledge_type: KnowledgeType) -> Self {
        Self {
            id: None,
            knowledge_type,
            title: None,
            content: None,
            status: ArtifactStatus::Draft,
            metadata: ArtifactMetadata::new("general"),
            related_ids: Vec::new(),
            parent_id: None,
            embedding: None,
        }
    }

    /// Use a caller-chosen id instead of a fresh UUID
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn status(mut self, status: ArtifactStatus) -> Self {
        self.status = status;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.metadata.domain = domain.into();
        self
    }

    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.metadata.subdomain = Some(subdomain.into());
        self
    }

    /// Add a tag (stored lowercase)
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into().to_lowercase());
        self
    }

    /// Add several tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata
            .tags
            .extend(tags.into_iter().map(|t| t.into().to_lowercase()));
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = language.into();
        self
    }

    /// Set the confidence score (clamped to 0.0–1.0)
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.metadata.set_confidence(confidence);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = Some(source.into());
        self
    }

    /// Add an extension metadata entry
    pub fn extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.extensions.insert(key.into(), value);
        self
    }

    pub fn related(mut self, id: Uuid) -> Self {
        self.related_ids.push(id);
        self
    }

    pub fn parent(mut self, id: Uuid) -> Self {
        self.parent_id = Some(id);
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Build the artifact, returning an error if title or content is missing.
    /// Checksum and keywords are derived here.
    pub fn build(self) -> Result<Artifact> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidArtifact("artifact title is required".to_string()))?;
        let content = self
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::InvalidArtifact("artifact content is required".to_string()))?;

        let now = Utc::now();
        let mut artifact = Artifact {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            title,
            content,
            knowledge_type: self.knowledge_type,
            status: self.status,
            metadata: self.metadata,
            version: Version::initial(),
            keywords: Vec::new(),
            embedding: self.embedding,
            related_ids: self.related_ids,
            parent_id: self.parent_id,
            contributions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        artifact.refresh_derived();
        Ok(artifact)
    }
}
