//! Inverted index with TF-IDF candidate scoring
//!
//! Every indexed artifact contributes postings from three fields:
//!
//! ```text
//! title + content ──tokenize──► content postings   (frequency = term count)
//! derived keywords ───────────► keyword postings   (frequency = keyword_weight)
//! metadata tags ──tokenize────► tag postings       (frequency = tag_weight)
//! ```
//!
//! Keyword and tag postings exist even when the term never occurs in the
//! text, so an exact tag or keyword query always reaches the artifact.
//! Re-indexing removes the previous postings first; indexing the same
//! artifact twice is indistinguishable from indexing it once.

use super::tokenizer;
use crate::artifact::{Artifact, KnowledgeType};
use crate::config::IndexerConfig;
use crate::retrieval::RelevanceScore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Extra keyword-match credit for a tag posting
const TAG_FIELD_BONUS: f64 = 0.2;
/// Extra keyword-match credit for a keyword posting
const KEYWORD_FIELD_BONUS: f64 = 0.1;

/// Field a posting was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexField {
    Content,
    Keyword,
    Tag,
}

/// One index entry linking a term to an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub artifact_id: Uuid,
    pub frequency: u32,
    /// Token positions within title + content (empty for synthetic postings)
    pub positions: Vec<usize>,
    pub field: IndexField,
}

/// Candidate produced by `Indexer::search`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub artifact_id: Uuid,
    pub score: RelevanceScore,
    /// Query terms that matched this artifact, in query order
    pub matched_terms: Vec<String>,
}

/// Index size counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub vocabulary: usize,
    pub postings: usize,
    pub domains: usize,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    domain: String,
    knowledge_type: KnowledgeType,
    /// Token count of title + content
    length: usize,
    /// Every term this document has a posting for
    terms: HashSet<String>,
}

#[derive(Debug, Default)]
struct IndexState {
    postings: HashMap<String, Vec<Posting>>,
    documents: HashMap<Uuid, IndexedDocument>,
    /// Number of distinct documents per term
    doc_freq: HashMap<String, usize>,
    /// domain -> term -> number of documents in that domain using the term
    domain_vocab: HashMap<String, HashMap<String, usize>>,
}

impl IndexState {
    fn insert(&mut self, artifact: &Artifact, config: &IndexerConfig) {
        let tokens = tokenizer::tokenize(&format!("{} {}", artifact.title, artifact.content));
        let mut content_terms: HashMap<&str, Vec<usize>> = HashMap::new();
        for (position, token) in tokens.iter().enumerate() {
            content_terms.entry(token.as_str()).or_default().push(position);
        }

        let mut new_postings: Vec<(String, Posting)> = content_terms
            .into_iter()
            .map(|(term, positions)| {
                (
                    term.to_string(),
                    Posting {
                        artifact_id: artifact.id,
                        frequency: positions.len() as u32,
                        positions,
                        field: IndexField::Content,
                    },
                )
            })
            .collect();

        for keyword in artifact.keywords.iter().take(config.max_keywords) {
            new_postings.push((
                keyword.to_lowercase(),
                Posting {
                    artifact_id: artifact.id,
                    frequency: config.keyword_weight,
                    positions: Vec::new(),
                    field: IndexField::Keyword,
                },
            ));
        }

        let tag_terms: HashSet<String> = artifact
            .metadata
            .tags
            .iter()
            .flat_map(|tag| tokenizer::tokenize(tag))
            .collect();
        for term in tag_terms {
            new_postings.push((
                term,
                Posting {
                    artifact_id: artifact.id,
                    frequency: config.tag_weight,
                    positions: Vec::new(),
                    field: IndexField::Tag,
                },
            ));
        }

        let domain = artifact.metadata.domain.to_lowercase();
        let mut terms = HashSet::new();
        for (term, posting) in new_postings {
            if terms.insert(term.clone()) {
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
                *self
                    .domain_vocab
                    .entry(domain.clone())
                    .or_default()
                    .entry(term.clone())
                    .or_insert(0) += 1;
            }
            self.postings.entry(term).or_default().push(posting);
        }

        self.documents.insert(
            artifact.id,
            IndexedDocument {
                domain,
                knowledge_type: artifact.knowledge_type,
                length: tokens.len(),
                terms,
            },
        );
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };

        for term in &doc.terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.retain(|p| p.artifact_id != *id);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
            decrement(&mut self.doc_freq, term);
            if let Some(vocab) = self.domain_vocab.get_mut(&doc.domain) {
                decrement(vocab, term);
                if vocab.is_empty() {
                    self.domain_vocab.remove(&doc.domain);
                }
            }
        }
        true
    }
}

fn decrement(counts: &mut HashMap<String, usize>, key: &str) {
    if let Some(count) = counts.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            counts.remove(key);
        }
    }
}

#[derive(Default)]
struct Accumulator {
    keyword: f64,
    matched: Vec<String>,
}

/// Thread-safe inverted index over artifact text, keywords and tags
pub struct Indexer {
    state: RwLock<IndexState>,
    config: IndexerConfig,
}

impl Indexer {
    /// Create an empty index
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            config,
        }
    }

    /// Index (or re-index) an artifact, replacing any previous postings.
    pub async fn index_artifact(&self, artifact: &Artifact) {
        let mut state = self.state.write().await;
        state.remove(&artifact.id);
        state.insert(artifact, &self.config);
        tracing::debug!(
            artifact_id = %artifact.id,
            documents = state.documents.len(),
            "Indexed artifact"
        );
    }

    /// Remove every trace of an artifact. Returns false if it was not indexed.
    pub async fn remove_artifact(&self, id: &Uuid) -> bool {
        let removed = self.state.write().await.remove(id);
        if removed {
            tracing::debug!(artifact_id = %id, "Removed artifact from index");
        }
        removed
    }

    /// Whether the artifact currently has postings
    pub async fn is_indexed(&self, id: &Uuid) -> bool {
        self.state.read().await.documents.contains_key(id)
    }

    /// Number of indexed documents
    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Postings currently held for `term`
    pub async fn postings(&self, term: &str) -> Vec<Posting> {
        self.state
            .read()
            .await
            .postings
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Score candidates for `query`.
    ///
    /// `domain` and `types` filter candidates; an empty `types` slice admits
    /// every type. Returns at most `limit` candidates ordered by overall
    /// score. A query with no indexed terms yields an empty list.
    pub async fn search(
        &self,
        query: &str,
        domain: Option<&str>,
        types: &[KnowledgeType],
        limit: usize,
    ) -> Vec<SearchCandidate> {
        let query_terms = tokenizer::unique_terms(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }
        let domain = domain.map(str::to_lowercase);

        let state = self.state.read().await;
        let total_docs = state.documents.len() as f64;
        let mut accumulators: HashMap<Uuid, Accumulator> = HashMap::new();

        for term in &query_terms {
            let Some(postings) = state.postings.get(term) else {
                continue;
            };
            let df = state.doc_freq.get(term).copied().unwrap_or(0) as f64;
            let idf = (total_docs / (df + 1.0)).ln() + 1.0;

            for posting in postings {
                let Some(doc) = state.documents.get(&posting.artifact_id) else {
                    continue;
                };
                if domain.as_deref().is_some_and(|d| doc.domain != d) {
                    continue;
                }
                if !types.is_empty() && !types.contains(&doc.knowledge_type) {
                    continue;
                }

                let normalized_tf = posting.frequency as f64 / (doc.length as f64 + 1.0);
                let entry = accumulators.entry(posting.artifact_id).or_default();
                entry.keyword += normalized_tf * idf;
                match posting.field {
                    IndexField::Tag => entry.keyword += TAG_FIELD_BONUS,
                    IndexField::Keyword => entry.keyword += KEYWORD_FIELD_BONUS,
                    IndexField::Content => {}
                }
                if !entry.matched.contains(term) {
                    entry.matched.push(term.clone());
                }
            }
        }

        if accumulators.is_empty() {
            tracing::debug!(query, "No index candidates");
            return Vec::new();
        }

        // Raw scores are strictly positive, so the lower bound is anchored
        // at zero and every matching candidate keeps a positive score.
        let max_keyword = accumulators
            .values()
            .map(|a| a.keyword)
            .fold(0.0_f64, f64::max);
        let query_len = query_terms.len() as f64;
        let domain_vocab = domain.as_ref().and_then(|d| state.domain_vocab.get(d));

        let mut candidates: Vec<SearchCandidate> = accumulators
            .into_iter()
            .map(|(artifact_id, acc)| {
                let keyword_match = if max_keyword > 0.0 {
                    (acc.keyword / max_keyword).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let domain_relevance = match domain_vocab {
                    Some(vocab) => {
                        acc.matched.iter().filter(|t| vocab.contains_key(*t)).count() as f64
                            / query_len
                    }
                    None => 0.0,
                };
                let semantic_similarity = acc.matched.len() as f64 / query_len;
                SearchCandidate {
                    artifact_id,
                    score: RelevanceScore {
                        semantic_similarity,
                        keyword_match,
                        domain_relevance,
                        ..Default::default()
                    },
                    matched_terms: acc.matched,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .overall_score()
                .partial_cmp(&a.score.overall_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.score
                        .keyword_match
                        .partial_cmp(&a.score.keyword_match)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        candidates.truncate(limit);

        tracing::debug!(query, candidates = candidates.len(), "Index search complete");
        candidates
    }

    /// Vocabulary terms starting with `prefix`, most widely used first.
    pub async fn suggest_terms(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let state = self.state.read().await;
        let mut matches: Vec<(&String, usize)> = state
            .doc_freq
            .iter()
            .filter(|(term, _)| term.starts_with(&prefix))
            .map(|(term, df)| (term, *df))
            .collect();
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        matches
            .into_iter()
            .take(limit)
            .map(|(term, _)| term.clone())
            .collect()
    }

    /// Terms that most often share a document with `term`, with the number
    /// of shared documents. The term itself is excluded.
    pub async fn get_related_terms(&self, term: &str, limit: usize) -> Vec<(String, usize)> {
        let term = term.to_lowercase();
        let state = self.state.read().await;
        let Some(postings) = state.postings.get(&term) else {
            return Vec::new();
        };

        let doc_ids: HashSet<Uuid> = postings.iter().map(|p| p.artifact_id).collect();
        let mut co_occurrence: HashMap<&str, usize> = HashMap::new();
        for doc in doc_ids.iter().filter_map(|id| state.documents.get(id)) {
            for other in doc.terms.iter().filter(|t| **t != term) {
                *co_occurrence.entry(other.as_str()).or_insert(0) += 1;
            }
        }

        let mut related: Vec<(String, usize)> = co_occurrence
            .into_iter()
            .map(|(t, count)| (t.to_string(), count))
            .collect();
        related.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        related.truncate(limit);
        related
    }

    /// Index size counters
    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            documents: state.documents.len(),
            vocabulary: state.postings.len(),
            postings: state.postings.values().map(Vec::len).sum(),
            domains: state.domain_vocab.len(),
        }
    }
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(IndexerConfig::default())
    }
}
