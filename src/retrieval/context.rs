//! Retrieval filters

use crate::artifact::KnowledgeType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Filters applied to a retrieval request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalContext {
    /// Restrict to one domain (case-insensitive)
    pub domain: Option<String>,
    /// Preferred subdomain; raises domain relevance on a match
    pub subdomain: Option<String>,
    /// Admitted knowledge types (empty = all)
    pub types: Vec<KnowledgeType>,
    /// Artifacts never returned
    pub excluded_ids: HashSet<Uuid>,
    /// Minimum stored confidence
    pub min_confidence: f64,
    /// Maximum age in days since the last modification
    pub max_age_days: Option<i64>,
}

impl RetrievalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = KnowledgeType>) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    pub fn exclude(mut self, id: Uuid) -> Self {
        self.excluded_ids.insert(id);
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = Some(days);
        self
    }
}
