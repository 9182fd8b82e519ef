//! Artifact storage
//!
//! `ArtifactStore` is the single source of truth for artifacts and their
//! version history; `backend` defines where records are persisted.

mod artifact_store;
pub mod backend;

pub use artifact_store::{ArtifactStore, StoreStats, ARCHIVED_FROM_KEY};
pub use backend::{ArtifactRecord, FileBackend, MemoryBackend, PersistenceBackend};
