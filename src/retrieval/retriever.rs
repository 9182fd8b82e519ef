//! Ranked, explained retrieval
//!
//! ```text
//! query ─► Indexer::search (limit × overfetch) ─► filter ─► re-score
//!       ─► sort by weighted score ─► truncate ─► record usage ─► results
//! ```
//!
//! Usage counters are only incremented for artifacts that survive
//! truncation, exactly once per returned artifact. A failure to persist
//! a usage increment fails the retrieval.

use super::context::RetrievalContext;
use super::score::{RelevanceScore, ScoreWeights};
use crate::artifact::{Artifact, ArtifactStatus, KnowledgeType};
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::tokenizer;
use crate::store::ArtifactStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Types considered actionable for `retrieve_for_task`
pub const TASK_TYPES: [KnowledgeType; 5] = [
    KnowledgeType::Procedure,
    KnowledgeType::Pattern,
    KnowledgeType::Template,
    KnowledgeType::Example,
    KnowledgeType::Rule,
];

/// Number of keywords appended to the title when searching for related artifacts
const RELATED_QUERY_KEYWORDS: usize = 5;

/// Domain relevance floor for an exact domain match
const DOMAIN_MATCH_FLOOR: f64 = 0.9;

/// One retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub artifact: Artifact,
    pub score: RelevanceScore,
    /// Overall score under the retriever's weight table
    pub relevance: f64,
    /// Content sentences containing a query term
    pub highlights: Vec<String>,
    pub explanation: String,
}

/// Recency factor from age in days
pub fn recency_score(age_days: i64) -> f64 {
    match age_days {
        d if d <= 7 => 1.0,
        d if d <= 30 => 0.8,
        d if d <= 90 => 0.6,
        d if d <= 365 => 0.4,
        _ => 0.2,
    }
}

/// Usage factor from the usage counter
pub fn usage_score(usage_count: u64) -> f64 {
    match usage_count {
        n if n >= 100 => 1.0,
        n if n >= 50 => 0.8,
        n if n >= 20 => 0.6,
        n if n >= 5 => 0.4,
        _ => 0.2,
    }
}

/// Human-readable summary of why a result ranked where it did
pub fn explain(score: &RelevanceScore, relevance: f64) -> String {
    let tier = if relevance > 0.8 {
        "Highly relevant"
    } else if relevance > 0.6 {
        "Relevant"
    } else if relevance > 0.4 {
        "Somewhat relevant"
    } else {
        "Possibly relevant"
    };

    let mut reasons = Vec::new();
    if score.semantic_similarity > 0.7 {
        reasons.push("strong semantic match");
    }
    if score.keyword_match > 0.7 {
        reasons.push("keyword match");
    }
    if score.domain_relevance > 0.8 {
        reasons.push("domain match");
    }
    if score.recency_score > 0.8 {
        reasons.push("recently updated");
    }
    if score.usage_score > 0.7 {
        reasons.push("frequently used");
    }

    if reasons.is_empty() {
        tier.to_string()
    } else {
        format!("{} ({})", tier, reasons.join(", "))
    }
}

/// Up to `max` content sentences containing one of `terms`, each cut to
/// `max_chars` characters with a trailing ellipsis.
pub fn highlights(content: &str, terms: &HashSet<String>, max: usize, max_chars: usize) -> Vec<String> {
    content
        .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .filter(|sentence| tokenizer::tokenize(sentence).iter().any(|t| terms.contains(t)))
        .take(max)
        .map(|sentence| {
            if sentence.chars().count() > max_chars {
                let cut: String = sentence.chars().take(max_chars).collect();
                format!("{}...", cut)
            } else {
                sentence.to_string()
            }
        })
        .collect()
}

/// Re-ranks index candidates against stored artifacts
pub struct Retriever {
    store: Arc<ArtifactStore>,
    config: RetrievalConfig,
}

impl Retriever {
    /// The weight table in `config` is fixed for the retriever's lifetime.
    pub fn new(store: Arc<ArtifactStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.config.weights
    }

    /// Ranked results for `query` under `context`
    pub async fn retrieve(
        &self,
        query: &str,
        context: &RetrievalContext,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let fetch = limit.saturating_mul(self.config.overfetch_factor.max(1));
        let candidates = self
            .store
            .search_records(query, context.domain.as_deref(), &context.types, fetch)
            .await;
        let candidate_count = candidates.len();

        let now = Utc::now();
        let subdomain = context.subdomain.as_deref().map(str::to_lowercase);
        let weights = &self.config.weights;
        let mut ranked: Vec<(Artifact, RelevanceScore, f64)> = Vec::new();

        for (candidate, artifact) in candidates {
            if context.excluded_ids.contains(&artifact.id) {
                continue;
            }
            if artifact.status == ArtifactStatus::Archived
                || artifact.metadata.confidence() < context.min_confidence
            {
                continue;
            }
            let age = artifact.age_days(now);
            if context.max_age_days.is_some_and(|max| age > max) {
                continue;
            }

            let mut score = candidate.score;
            score.recency_score = recency_score(age);
            score.usage_score = usage_score(artifact.metadata.usage_count);
            score.confidence_score = artifact.metadata.confidence();
            if context.domain.is_some() {
                let subdomain_match = subdomain.is_some()
                    && artifact.metadata.subdomain.as_deref().map(str::to_lowercase) == subdomain;
                let floor = if subdomain_match { 1.0 } else { DOMAIN_MATCH_FLOOR };
                score.domain_relevance = score.domain_relevance.max(floor);
            }

            let relevance = score.weighted_score(weights);
            ranked.push((artifact, score, relevance));
        }

        ranked.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        ranked.truncate(limit);

        let terms: HashSet<String> = tokenizer::unique_terms(query).into_iter().collect();
        let mut results = Vec::with_capacity(ranked.len());
        for (mut artifact, score, relevance) in ranked {
            if self.store.record_usage(&artifact.id).await? {
                artifact.metadata.usage_count += 1;
            }
            results.push(RetrievalResult {
                highlights: highlights(
                    &artifact.content,
                    &terms,
                    self.config.max_highlights,
                    self.config.highlight_max_chars,
                ),
                explanation: explain(&score, relevance),
                artifact,
                score,
                relevance,
            });
        }

        tracing::debug!(
            query,
            candidates = candidate_count,
            returned = results.len(),
            "Retrieval complete"
        );
        Ok(results)
    }

    /// Retrieve restricted to a single knowledge type
    pub async fn retrieve_by_type(
        &self,
        query: &str,
        knowledge_type: KnowledgeType,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let mut context = RetrievalContext::new().types([knowledge_type]);
        context.domain = domain.map(str::to_string);
        self.retrieve(query, &context, limit).await
    }

    /// Artifacts similar to `id`, searched by its title and leading
    /// keywords. Unknown ids yield an empty list.
    pub async fn retrieve_related(&self, id: &Uuid, limit: usize) -> Result<Vec<RetrievalResult>> {
        let Some(source) = self.store.get(id).await else {
            return Ok(Vec::new());
        };
        let mut query = source.title.clone();
        for keyword in source.keywords.iter().take(RELATED_QUERY_KEYWORDS) {
            query.push(' ');
            query.push_str(keyword);
        }
        let context = RetrievalContext::new().exclude(source.id);
        self.retrieve(&query, &context, limit).await
    }

    /// Actionable knowledge (procedures, patterns, templates, examples,
    /// rules) for carrying out `task`
    pub async fn retrieve_for_task(
        &self,
        task: &str,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let mut context = RetrievalContext::new()
            .types(TASK_TYPES)
            .min_confidence(self.config.task_min_confidence);
        context.domain = domain.map(str::to_string);
        self.retrieve(task, &context, limit).await
    }

    /// Most used non-archived artifacts. Does not record usage.
    pub async fn get_popular(&self, domain: Option<&str>, limit: usize) -> Vec<Artifact> {
        let mut artifacts = match domain {
            Some(domain) => self.store.list_by_domain(domain, false, None).await,
            None => self.store.list_all(false, None).await,
        };
        artifacts.sort_by(|a, b| {
            b.metadata
                .usage_count
                .cmp(&a.metadata.usage_count)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        artifacts.truncate(limit);
        artifacts
    }
}
