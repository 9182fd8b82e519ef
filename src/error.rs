//! LoreVault error types
//!
//! Storage and index precondition violations surface as `Error`. Governance
//! outcomes (duplicates, validation failures, missing targets) never do;
//! they end up as terminal proposal states instead.

use thiserror::Error;
use uuid::Uuid;

/// LoreVault error type
#[derive(Error, Debug)]
pub enum Error {
    /// A mutation assumed an existing artifact or proposal that is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// `store()` was called with an id that is already present
    #[error("Duplicate artifact id: {0}")]
    DuplicateId(Uuid),

    /// An artifact with the same title already exists
    #[error("Duplicate artifact title '{title}': already stored as {existing}")]
    DuplicateTitle { title: String, existing: Uuid },

    /// Stored checksum does not match the artifact content
    #[error("Integrity error for artifact {id}: {reason}")]
    Integrity { id: String, reason: String },

    /// An artifact failed construction-time checks
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// A typed patch failed schema validation
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// A proposal was reviewed after it had already been resolved
    #[error("Proposal {0} is no longer pending")]
    ProposalClosed(Uuid),

    /// Persistence backend failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for LoreVault operations
pub type Result<T> = std::result::Result<T, Error>;
