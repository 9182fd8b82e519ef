//! Proposal objects handed to the review workflow
//!
//! A proposal starts `Pending` and ends `Merged` or `Rejected`. Approval is
//! an event on the way to `Merged`, not a state of its own.

use crate::artifact::{ArtifactPatch, ContributorType, KnowledgeType, VersionBump};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who is making a contribution, as supplied by the identity layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorIdentity {
    pub id: String,
    pub contributor_type: ContributorType,
}

impl ContributorIdentity {
    pub fn new(id: impl Into<String>, contributor_type: ContributorType) -> Self {
        Self {
            id: id.into(),
            contributor_type,
        }
    }
}

/// Fields of a new knowledge submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSubmission {
    pub title: String,
    pub content: String,
    pub knowledge_type: KnowledgeType,
    pub domain: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub source: Option<String>,
}

impl KnowledgeSubmission {
    /// Submission in the "general" domain with confidence 0.5
    pub fn new(title: impl Into<String>, content: impl Into<String>, knowledge_type: KnowledgeType) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            knowledge_type,
            domain: "general".to_string(),
            subdomain: None,
            tags: Vec::new(),
            confidence: 0.5,
            source: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    NewKnowledge,
    Update,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Merged,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merged => "merged",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the proposal would change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposalChange {
    /// A new artifact, built from the submission on merge
    NewKnowledge { submission: KnowledgeSubmission },
    /// Typed patches against an existing artifact
    Update {
        patches: Vec<ArtifactPatch>,
        bump: VersionBump,
    },
    /// Confidence adjustment, already clamped
    Validation { adjustment: f64 },
}

/// A contribution moving through governance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub status: ProposalStatus,
    pub contributor: ContributorIdentity,
    pub change: ProposalChange,
    /// Why the contributor proposed the change
    pub reason: String,
    /// Affected artifact (set on merge for new knowledge)
    pub target_id: Option<Uuid>,
    /// Why the proposal was rejected
    pub rejection_reason: Option<String>,
    /// Existing artifact with the same title
    pub duplicate_of: Option<Uuid>,
    pub auto_approved: bool,
    pub reviewer: Option<String>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub(crate) fn new(
        contributor: &ContributorIdentity,
        change: ProposalChange,
        reason: &str,
        target_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ProposalStatus::Pending,
            contributor: contributor.clone(),
            change,
            reason: reason.to_string(),
            target_id,
            rejection_reason: None,
            duplicate_of: None,
            auto_approved: false,
            reviewer: None,
            review_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn kind(&self) -> ProposalKind {
        match self.change {
            ProposalChange::NewKnowledge { .. } => ProposalKind::NewKnowledge,
            ProposalChange::Update { .. } => ProposalKind::Update,
            ProposalChange::Validation { .. } => ProposalKind::Validation,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub(crate) fn reject(&mut self, reason: impl Into<String>) {
        self.status = ProposalStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.resolved_at = Some(Utc::now());
    }

    pub(crate) fn merge(&mut self, target_id: Uuid) {
        self.status = ProposalStatus::Merged;
        self.target_id = Some(target_id);
        self.resolved_at = Some(Utc::now());
    }
}
