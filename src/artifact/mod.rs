//! Knowledge artifact data model
//!
//! Artifacts, their versions, contribution records and typed update patches.

pub mod model;
pub mod patch;
pub mod version;

pub use model::{
    Artifact, ArtifactBuilder, ArtifactMetadata, ArtifactStatus, ArtifactSummary,
    ContributionAction, ContributionRecord, ContributorType, KnowledgeType, MAX_KEYWORDS,
};
pub use patch::{apply_patches, ArtifactPatch};
pub use version::{Version, VersionBump};
