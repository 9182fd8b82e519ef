//! Contribution governance
//!
//! `Contributor` gates every write behind a `Proposal`, applying length
//! checks, pluggable validators, exact-title duplicate detection and
//! auto-approval rules before anything reaches the store.

mod contributor;
mod proposal;

pub use contributor::{Contributor, KnowledgeValidator, AUTO_REVIEWER};
pub use proposal::{
    ContributorIdentity, KnowledgeSubmission, Proposal, ProposalChange, ProposalKind,
    ProposalStatus,
};
