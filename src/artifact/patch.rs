//! Typed field patches for artifact updates
//!
//! Updates are expressed as a list of `ArtifactPatch` values, one variant per
//! mutable field. Every patch in a list is validated against the target
//! artifact before any of them is applied, so a rejected list leaves the
//! artifact untouched.

use super::model::{Artifact, KnowledgeType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A single typed change to one mutable artifact field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ArtifactPatch {
    Title(String),
    Content(String),
    KnowledgeType(KnowledgeType),
    Domain(String),
    Subdomain(Option<String>),
    /// Replace the whole tag set
    Tags(BTreeSet<String>),
    AddTag(String),
    RemoveTag(String),
    Language(String),
    Confidence(f64),
    Source(Option<String>),
    RelatedIds(Vec<Uuid>),
    ParentId(Option<Uuid>),
    Embedding(Option<Vec<f32>>),
    Extension {
        key: String,
        value: serde_json::Value,
    },
}

impl ArtifactPatch {
    /// Name of the field this patch touches
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Title(_) => "title",
            Self::Content(_) => "content",
            Self::KnowledgeType(_) => "knowledge_type",
            Self::Domain(_) => "domain",
            Self::Subdomain(_) => "subdomain",
            Self::Tags(_) | Self::AddTag(_) | Self::RemoveTag(_) => "tags",
            Self::Language(_) => "language",
            Self::Confidence(_) => "confidence",
            Self::Source(_) => "source",
            Self::RelatedIds(_) => "related_ids",
            Self::ParentId(_) => "parent_id",
            Self::Embedding(_) => "embedding",
            Self::Extension { .. } => "extensions",
        }
    }

    /// Check the patch against the target artifact's schema.
    pub fn validate(&self, artifact: &Artifact) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(Error::InvalidPatch(format!("{}: {}", self.field_name(), msg)))
        };
        match self {
            Self::Title(v) | Self::Content(v) | Self::Domain(v) | Self::Language(v)
                if v.trim().is_empty() =>
            {
                invalid("must not be empty")
            }
            Self::AddTag(tag) | Self::RemoveTag(tag) if tag.trim().is_empty() => {
                invalid("tag must not be empty")
            }
            Self::Tags(tags) if tags.iter().any(|t| t.trim().is_empty()) => {
                invalid("tags must not be empty")
            }
            Self::Confidence(c) if !c.is_finite() || !(0.0..=1.0).contains(c) => {
                invalid("must be within [0, 1]")
            }
            Self::RelatedIds(ids) if ids.contains(&artifact.id) => {
                invalid("an artifact cannot relate to itself")
            }
            Self::ParentId(Some(id)) if *id == artifact.id => {
                invalid("an artifact cannot be its own parent")
            }
            Self::Embedding(Some(values)) if values.iter().any(|v| !v.is_finite()) => {
                invalid("embedding values must be finite")
            }
            Self::Extension { key, .. } if key.trim().is_empty() => invalid("key must not be empty"),
            _ => Ok(()),
        }
    }

    /// Apply the patch. Callers validate first.
    pub fn apply(self, artifact: &mut Artifact) {
        match self {
            Self::Title(v) => artifact.title = v.trim().to_string(),
            Self::Content(v) => artifact.content = v,
            Self::KnowledgeType(t) => artifact.knowledge_type = t,
            Self::Domain(v) => artifact.metadata.domain = v,
            Self::Subdomain(v) => artifact.metadata.subdomain = v,
            Self::Tags(tags) => {
                artifact.metadata.tags = tags.into_iter().map(|t| t.to_lowercase()).collect()
            }
            Self::AddTag(tag) => {
                artifact.metadata.tags.insert(tag.to_lowercase());
            }
            Self::RemoveTag(tag) => {
                artifact.metadata.tags.remove(&tag.to_lowercase());
            }
            Self::Language(v) => artifact.metadata.language = v,
            Self::Confidence(c) => artifact.metadata.set_confidence(c),
            Self::Source(v) => artifact.metadata.source = v,
            Self::RelatedIds(ids) => artifact.related_ids = ids,
            Self::ParentId(id) => artifact.parent_id = id,
            Self::Embedding(e) => artifact.embedding = e,
            Self::Extension { key, value } => {
                artifact.metadata.extensions.insert(key, value);
            }
        }
    }
}

/// Validate every patch, then apply them in order.
pub fn apply_patches(artifact: &mut Artifact, patches: Vec<ArtifactPatch>) -> Result<()> {
    for patch in &patches {
        patch.validate(artifact)?;
    }
    for patch in patches {
        patch.apply(artifact);
    }
    Ok(())
}
