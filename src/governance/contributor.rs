//! Contribution governance
//!
//! Every artifact creation, update and validation goes through a proposal:
//!
//! ```text
//! propose ─► validate ──fail──► REJECTED
//!               │
//!               ├─► duplicate / missing target ──► REJECTED
//!               │
//!               ├─► auto-approvable ──► apply ──► MERGED
//!               │
//!               └─► PENDING ──review──► apply ──► MERGED
//!                                 └──► REJECTED
//! ```
//!
//! Governance outcomes are proposal states, never errors. Only storage
//! failures and unknown proposal ids surface as `Error`; a proposal whose
//! merge hits a storage failure is still recorded, left pending.
//!
//! Merges run inside the store's write critical section, so a duplicate
//! title or a change committed concurrently to the target is seen by the
//! merge itself rather than by an earlier read.

use super::proposal::{ContributorIdentity, KnowledgeSubmission, Proposal, ProposalChange, ProposalStatus};
use crate::artifact::{
    apply_patches, Artifact, ArtifactBuilder, ArtifactPatch, ArtifactStatus, ContributionAction,
    ContributionRecord, VersionBump,
};
use crate::config::GovernanceConfig;
use crate::error::{Error, Result};
use crate::store::ArtifactStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Reviewer id recorded on automatic approvals
pub const AUTO_REVIEWER: &str = "auto";

/// Pluggable content check run on every draft before it can merge.
///
/// Return `Err(reason)` to reject; the reason ends up on the proposal.
#[async_trait]
pub trait KnowledgeValidator: Send + Sync {
    async fn validate(&self, artifact: &Artifact) -> std::result::Result<(), String>;

    /// Human-readable name for this validator (used in rejection reasons)
    fn name(&self) -> &str;
}

/// Proposal-based gatekeeper in front of the artifact store
pub struct Contributor {
    store: Arc<ArtifactStore>,
    config: GovernanceConfig,
    validators: Vec<Arc<dyn KnowledgeValidator>>,
    proposals: RwLock<HashMap<Uuid, Proposal>>,
    review_lock: Mutex<()>,
}

impl Contributor {
    pub fn new(store: Arc<ArtifactStore>, config: GovernanceConfig) -> Self {
        Self {
            store,
            config,
            validators: Vec::new(),
            proposals: RwLock::new(HashMap::new()),
            review_lock: Mutex::new(()),
        }
    }

    /// Add a validation hook, run after the built-in length checks
    pub fn with_validator(mut self, validator: Arc<dyn KnowledgeValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    // =========================================================================
    // Proposals
    // =========================================================================

    /// Propose a new artifact.
    pub async fn propose_knowledge(
        &self,
        contributor: &ContributorIdentity,
        submission: KnowledgeSubmission,
        reason: &str,
    ) -> Result<Proposal> {
        let mut proposal = Proposal::new(
            contributor,
            ProposalChange::NewKnowledge {
                submission: submission.clone(),
            },
            reason,
            None,
        );
        let draft = match self.vet_draft(&submission).await {
            Ok(draft) => draft,
            Err(why) => return Ok(self.finish_rejected(proposal, why).await),
        };
        let confidence = draft.metadata.confidence();
        let title = draft.title;

        if let Some(existing) = self.store.get_by_title(&title).await {
            proposal.duplicate_of = Some(existing.id);
            let why = format!("duplicate of artifact {}", existing.id);
            return Ok(self.finish_rejected(proposal, why).await);
        }

        if self.auto_approvable(contributor, Some(confidence)) {
            return self.merge_and_record(proposal).await;
        }

        tracing::info!(proposal_id = %proposal.id, title = %title, "Knowledge proposal queued for review");
        Ok(self.record(proposal).await)
    }

    /// Propose typed changes to an existing artifact. `bump` defaults to patch.
    pub async fn propose_update(
        &self,
        contributor: &ContributorIdentity,
        target_id: Uuid,
        patches: Vec<ArtifactPatch>,
        reason: &str,
        bump: Option<VersionBump>,
    ) -> Result<Proposal> {
        let proposed_confidence = patches.iter().rev().find_map(|p| match p {
            ArtifactPatch::Confidence(c) => Some(*c),
            _ => None,
        });
        let proposal = Proposal::new(
            contributor,
            ProposalChange::Update {
                patches,
                bump: bump.unwrap_or_default(),
            },
            reason,
            Some(target_id),
        );

        let Some(target) = self.store.get(&target_id).await else {
            let why = format!("target artifact {} does not exist", target_id);
            return Ok(self.finish_rejected(proposal, why).await);
        };

        if let Err(why) = self.preview_update(&target, &proposal.change).await {
            return Ok(self.finish_rejected(proposal, why).await);
        }

        if self.auto_approvable(contributor, proposed_confidence) {
            return self.merge_and_record(proposal).await;
        }

        tracing::info!(proposal_id = %proposal.id, artifact_id = %target_id, "Update proposal queued for review");
        Ok(self.record(proposal).await)
    }

    /// Confirm or dispute an artifact. Always processed immediately: the
    /// confidence adjustment is clamped to the configured bound, the
    /// validation counter and timestamp advance, and a patch version is cut.
    pub async fn propose_validation(
        &self,
        contributor: &ContributorIdentity,
        target_id: Uuid,
        confidence_adjustment: f64,
        notes: &str,
    ) -> Result<Proposal> {
        let bound = self.config.max_validation_adjustment;
        let adjustment = if confidence_adjustment.is_finite() {
            confidence_adjustment.clamp(-bound, bound)
        } else {
            0.0
        };
        let proposal = Proposal::new(
            contributor,
            ProposalChange::Validation { adjustment },
            notes,
            Some(target_id),
        );

        if self.store.get(&target_id).await.is_none() {
            let why = format!("target artifact {} does not exist", target_id);
            return Ok(self.finish_rejected(proposal, why).await);
        }

        self.merge_and_record(proposal).await
    }

    /// Resolve a pending proposal by hand.
    ///
    /// Fails with `NotFound` for unknown ids and `ProposalClosed` for
    /// proposals that are no longer pending. A storage failure leaves the
    /// proposal pending.
    pub async fn review_proposal(
        &self,
        proposal_id: &Uuid,
        approved: bool,
        reviewer: &str,
        notes: &str,
    ) -> Result<Proposal> {
        // Reviews are serialized; the proposal map is only locked to read
        // the snapshot and to commit the outcome.
        let _review = self.review_lock.lock().await;
        let mut updated = self
            .get_proposal(proposal_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("proposal {}", proposal_id)))?;
        if updated.status.is_terminal() {
            return Err(Error::ProposalClosed(*proposal_id));
        }

        updated.reviewer = Some(reviewer.to_string());
        if !notes.is_empty() {
            updated.review_notes = Some(notes.to_string());
        }

        if !approved {
            let why = if notes.is_empty() {
                format!("rejected by {}", reviewer)
            } else {
                notes.to_string()
            };
            updated.reject(why);
            tracing::info!(proposal_id = %proposal_id, reviewer, "Proposal rejected in review");
        } else if let Some(why) = self.recheck(&updated).await {
            updated.reject(why);
            tracing::warn!(proposal_id = %proposal_id, reason = ?updated.rejection_reason, "Approved proposal could not be applied");
        } else {
            self.merge(&mut updated, reviewer, false).await?;
        }

        Ok(self.record(updated).await)
    }

    pub async fn get_proposal(&self, proposal_id: &Uuid) -> Option<Proposal> {
        self.proposals.read().await.get(proposal_id).cloned()
    }

    /// Proposals, oldest first, optionally restricted to one status
    pub async fn list_proposals(&self, status: Option<ProposalStatus>) -> Vec<Proposal> {
        let proposals = self.proposals.read().await;
        let mut list: Vec<Proposal> = proposals
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub async fn pending_count(&self) -> usize {
        self.proposals
            .read()
            .await
            .values()
            .filter(|p| p.is_pending())
            .count()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn auto_approvable(&self, contributor: &ContributorIdentity, confidence: Option<f64>) -> bool {
        self.config
            .trusted_contributors
            .contains(&contributor.contributor_type)
            || confidence.is_some_and(|c| c >= self.config.auto_approve_threshold)
    }

    async fn run_validators(&self, artifact: &Artifact) -> std::result::Result<(), String> {
        for validator in &self.validators {
            validator
                .validate(artifact)
                .await
                .map_err(|why| format!("validation failed ({}): {}", validator.name(), why))?;
        }
        Ok(())
    }

    fn check_lengths(&self, title: &str, content: &str) -> std::result::Result<(), String> {
        let title_len = title.trim().chars().count();
        if title_len < self.config.min_title_len {
            return Err(format!(
                "validation failed: title must be at least {} characters, got {}",
                self.config.min_title_len, title_len
            ));
        }
        let content_len = content.trim().chars().count();
        if content_len < self.config.min_content_len {
            return Err(format!(
                "validation failed: content must be at least {} characters, got {}",
                self.config.min_content_len, content_len
            ));
        }
        Ok(())
    }

    fn build_draft(&self, submission: &KnowledgeSubmission) -> std::result::Result<Artifact, String> {
        self.check_lengths(&submission.title, &submission.content)?;

        let mut builder = ArtifactBuilder::new(submission.knowledge_type)
            .title(submission.title.as_str())
            .content(submission.content.as_str())
            .domain(submission.domain.as_str())
            .tags(submission.tags.iter().map(String::as_str))
            .confidence(submission.confidence);
        if let Some(subdomain) = &submission.subdomain {
            builder = builder.subdomain(subdomain.as_str());
        }
        if let Some(source) = &submission.source {
            builder = builder.source(source.as_str());
        }
        builder
            .build()
            .map_err(|e| format!("validation failed: {}", e))
    }

    /// Build the draft and run every validator over it.
    async fn vet_draft(&self, submission: &KnowledgeSubmission) -> std::result::Result<Artifact, String> {
        let draft = self.build_draft(submission)?;
        self.run_validators(&draft).await?;
        Ok(draft)
    }

    /// Apply `change` to a copy of `target` and run every check on the result.
    async fn preview_update(&self, target: &Artifact, change: &ProposalChange) -> std::result::Result<Artifact, String> {
        let ProposalChange::Update { patches, .. } = change else {
            return Ok(target.clone());
        };
        if patches.is_empty() {
            return Err("validation failed: no changes proposed".to_string());
        }
        let mut preview = target.clone();
        apply_patches(&mut preview, patches.clone()).map_err(|e| format!("validation failed: {}", e))?;
        self.check_lengths(&preview.title, &preview.content)?;
        self.run_validators(&preview).await?;
        Ok(preview)
    }

    /// Reason an approved proposal can no longer be applied, if any
    async fn recheck(&self, proposal: &Proposal) -> Option<String> {
        match &proposal.change {
            // Title uniqueness is enforced by the merge itself.
            ProposalChange::NewKnowledge { submission } => self.vet_draft(submission).await.err(),
            ProposalChange::Update { .. } | ProposalChange::Validation { .. } => {
                let target_id = proposal.target_id?;
                let Some(target) = self.store.get(&target_id).await else {
                    return Some("target no longer exists".to_string());
                };
                self.preview_update(&target, &proposal.change).await.err()
            }
        }
    }

    fn contribution(proposal: &Proposal, action: ContributionAction, reviewer: &str, auto: bool) -> ContributionRecord {
        ContributionRecord {
            contributor_id: proposal.contributor.id.clone(),
            contributor_type: proposal.contributor.contributor_type,
            action,
            reason: proposal.reason.clone(),
            timestamp: Utc::now(),
            approved: true,
            auto_approved: auto,
            approved_by: Some(reviewer.to_string()),
            proposal_id: Some(proposal.id),
        }
    }

    /// Auto-approve and merge, recording the proposal whatever the outcome.
    async fn merge_and_record(&self, mut proposal: Proposal) -> Result<Proposal> {
        let outcome = self.merge(&mut proposal, AUTO_REVIEWER, true).await;
        let proposal = self.record(proposal).await;
        outcome.map(|()| proposal)
    }

    /// Write an approved proposal through to the store.
    ///
    /// Marks the proposal merged, or rejected when the store refuses the
    /// change on governance grounds. Storage failures leave it untouched.
    async fn merge(&self, proposal: &mut Proposal, reviewer: &str, auto: bool) -> Result<()> {
        let contributor_id = proposal.contributor.id.clone();
        let written = match &proposal.change {
            ProposalChange::NewKnowledge { submission } => {
                match self.build_draft(submission) {
                    Ok(mut artifact) => {
                        artifact.status = ArtifactStatus::Approved;
                        artifact.version.created_by = contributor_id;
                        artifact.record_contribution(Self::contribution(
                            proposal,
                            ContributionAction::Create,
                            reviewer,
                            auto,
                        ));
                        self.store.store_unique(artifact).await
                    }
                    Err(why) => Err(Error::InvalidArtifact(why)),
                }
            }
            ProposalChange::Update { patches, bump } => {
                let target_id = Self::target_of(proposal)?;
                let contribution = Self::contribution(proposal, ContributionAction::Update, reviewer, auto);
                let changelog = if proposal.reason.is_empty() {
                    let fields: Vec<&str> = patches.iter().map(ArtifactPatch::field_name).collect();
                    format!("Updated {}", fields.join(", "))
                } else {
                    proposal.reason.clone()
                };
                let patches = patches.clone();
                self.store
                    .update_with(&target_id, *bump, &contributor_id, |artifact| {
                        apply_patches(artifact, patches)?;
                        self.check_lengths(&artifact.title, &artifact.content)
                            .map_err(Error::InvalidPatch)?;
                        artifact.record_contribution(contribution);
                        Ok(changelog)
                    })
                    .await
                    .map(|artifact| artifact.id)
            }
            ProposalChange::Validation { adjustment } => {
                let target_id = Self::target_of(proposal)?;
                let contribution = Self::contribution(proposal, ContributionAction::Validate, reviewer, auto);
                let adjustment = *adjustment;
                self.store
                    .update_with(&target_id, VersionBump::Patch, &contributor_id, |artifact| {
                        let before = artifact.metadata.confidence();
                        artifact.metadata.set_confidence(before + adjustment);
                        let after = artifact.metadata.confidence();
                        artifact.metadata.validation_count += 1;
                        artifact.metadata.last_validated = Some(Utc::now());
                        artifact.record_contribution(contribution);
                        Ok(format!(
                            "Validated by {}: confidence {:.2} -> {:.2}",
                            contributor_id, before, after
                        ))
                    })
                    .await
                    .map(|artifact| artifact.id)
            }
        };

        match written {
            Ok(target_id) => {
                proposal.auto_approved = auto;
                if !auto {
                    proposal.reviewer = Some(reviewer.to_string());
                }
                proposal.merge(target_id);
                tracing::info!(
                    proposal_id = %proposal.id,
                    artifact_id = %target_id,
                    kind = ?proposal.kind(),
                    auto_approved = auto,
                    "Proposal merged"
                );
                Ok(())
            }
            Err(Error::DuplicateTitle { existing, .. }) => {
                proposal.duplicate_of = Some(existing);
                Self::reject(proposal, format!("duplicate of artifact {}", existing));
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                Self::reject(proposal, "target no longer exists".to_string());
                Ok(())
            }
            Err(Error::InvalidArtifact(why)) | Err(Error::InvalidPatch(why)) => {
                let why = if why.starts_with("validation failed") {
                    why
                } else {
                    format!("validation failed: {}", why)
                };
                Self::reject(proposal, why);
                Ok(())
            }
            Err(e) => {
                tracing::error!(proposal_id = %proposal.id, "Proposal merge failed: {}", e);
                Err(e)
            }
        }
    }

    fn target_of(proposal: &Proposal) -> Result<Uuid> {
        proposal
            .target_id
            .ok_or_else(|| Error::NotFound(format!("target of proposal {}", proposal.id)))
    }

    fn reject(proposal: &mut Proposal, reason: String) {
        tracing::warn!(
            proposal_id = %proposal.id,
            contributor = %proposal.contributor.id,
            reason = %reason,
            "Proposal rejected"
        );
        proposal.reject(reason);
    }

    async fn finish_rejected(&self, mut proposal: Proposal, reason: String) -> Proposal {
        Self::reject(&mut proposal, reason);
        self.record(proposal).await
    }

    async fn record(&self, proposal: Proposal) -> Proposal {
        self.proposals
            .write()
            .await
            .insert(proposal.id, proposal.clone());
        proposal
    }
}
