//! Multi-factor relevance scores
//!
//! Six independent factors in [0, 1] plus open-ended custom scores. The
//! overall score is a weighted sum, clamped to [0, 1] and rounded to four
//! decimals. Custom score `name` is weighted by the `custom_<name>` entry of
//! the weight table and contributes nothing when that entry is absent.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix for custom score weight keys
pub const CUSTOM_WEIGHT_PREFIX: &str = "custom_";

/// Weight table applied to the relevance factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub semantic_similarity: f64,
    pub keyword_match: f64,
    pub domain_relevance: f64,
    pub recency: f64,
    pub usage: f64,
    pub confidence: f64,
    /// `custom_<name>` weights for custom scores
    #[serde(flatten)]
    pub custom: HashMap<String, f64>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic_similarity: 0.35,
            keyword_match: 0.20,
            domain_relevance: 0.20,
            recency: 0.10,
            usage: 0.10,
            confidence: 0.05,
            custom: HashMap::new(),
        }
    }
}

impl ScoreWeights {
    /// Weight for custom score `name` (0 if unset)
    pub fn custom_weight(&self, name: &str) -> f64 {
        self.custom
            .get(&format!("{}{}", CUSTOM_WEIGHT_PREFIX, name))
            .copied()
            .unwrap_or(0.0)
    }

    /// Set the weight for custom score `name`
    pub fn with_custom(mut self, name: &str, weight: f64) -> Self {
        self.custom
            .insert(format!("{}{}", CUSTOM_WEIGHT_PREFIX, name), weight);
        self
    }

    /// Reject negative or non-finite weights and malformed custom keys.
    pub fn validate(&self) -> Result<()> {
        let fixed = [
            ("semantic_similarity", self.semantic_similarity),
            ("keyword_match", self.keyword_match),
            ("domain_relevance", self.domain_relevance),
            ("recency", self.recency),
            ("usage", self.usage),
            ("confidence", self.confidence),
        ];
        for (name, weight) in fixed
            .iter()
            .map(|(n, w)| (n.to_string(), *w))
            .chain(self.custom.iter().map(|(n, w)| (n.clone(), *w)))
        {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::Config(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if let Some(bad) = self
            .custom
            .keys()
            .find(|k| !k.starts_with(CUSTOM_WEIGHT_PREFIX) || k.len() == CUSTOM_WEIGHT_PREFIX.len())
        {
            return Err(Error::Config(format!(
                "custom weight key '{}' must look like '{}<name>'",
                bad, CUSTOM_WEIGHT_PREFIX
            )));
        }
        Ok(())
    }
}

/// Score breakdown of one candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub semantic_similarity: f64,
    pub keyword_match: f64,
    pub domain_relevance: f64,
    pub recency_score: f64,
    pub usage_score: f64,
    pub confidence_score: f64,
    #[serde(default)]
    pub custom_scores: HashMap<String, f64>,
}

impl RelevanceScore {
    /// Overall score under the default weight table
    pub fn overall_score(&self) -> f64 {
        self.weighted_score(&ScoreWeights::default())
    }

    /// Overall score under `weights`
    pub fn weighted_score(&self, weights: &ScoreWeights) -> f64 {
        let base = self.semantic_similarity * weights.semantic_similarity
            + self.keyword_match * weights.keyword_match
            + self.domain_relevance * weights.domain_relevance
            + self.recency_score * weights.recency
            + self.usage_score * weights.usage
            + self.confidence_score * weights.confidence;
        let custom: f64 = self
            .custom_scores
            .iter()
            .map(|(name, value)| value * weights.custom_weight(name))
            .sum();
        round4((base + custom).clamp(0.0, 1.0))
    }

    /// Record a named custom score (clamped to [0, 1])
    pub fn set_custom(&mut self, name: impl Into<String>, value: f64) {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        self.custom_scores.insert(name.into(), value);
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
