//! LoreVault - versioned knowledge artifact store
//!
//! LoreVault stores discrete units of domain knowledge ("artifacts"),
//! versions every change, indexes artifacts for full-text search and ranks
//! results with a multi-factor relevance model. All writes from humans and
//! agents go through a proposal workflow with validation, duplicate
//! detection and auto-approval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        KnowledgeService                           │
//! │                                                                   │
//! │  ┌──────────────┐  propose / review   ┌────────────────────────┐  │
//! │  │ Contributor  │ ──────────────────► │     ArtifactStore      │  │
//! │  │  - proposals │   store / update    │  - id -> artifact      │  │
//! │  │  - validators│                     │  - id -> history       │  │
//! │  │  - auto-merge│                     │  - domain/type sets    │  │
//! │  └──────────────┘                     └──────┬──────────┬──────┘  │
//! │                                    re-index  │          │ persist │
//! │  ┌──────────────┐  candidates  ┌─────────────▼──┐  ┌────▼──────┐  │
//! │  │  Retriever   │ ◄─────────── │    Indexer     │  │  Backend  │  │
//! │  │  - re-rank   │              │  - postings    │  │  memory / │  │
//! │  │  - explain   │              │  - TF-IDF      │  │  files    │  │
//! │  │  - usage     │              └────────────────┘  └───────────┘  │
//! │  └──────────────┘                                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`artifact`]: artifact data model, versions, typed patches
//! - [`store`]: versioned artifact store and persistence backends
//! - [`index`]: tokenizer and inverted index
//! - [`retrieval`]: relevance scores and ranked retrieval
//! - [`governance`]: proposals and the contribution workflow
//! - [`service`]: assembly of all components from configuration
//! - [`config`]: configuration management

pub mod artifact;
pub mod config;
pub mod error;
pub mod governance;
pub mod index;
pub mod retrieval;
pub mod service;
pub mod store;

pub use config::LoreVaultConfig;
pub use error::{Error, Result};
pub use service::KnowledgeService;
