//! Relevance scoring and ranked retrieval

mod context;
mod retriever;
mod score;

pub use context::RetrievalContext;
pub use retriever::{
    explain, highlights, recency_score, usage_score, RetrievalResult, Retriever, TASK_TYPES,
};
pub use score::{RelevanceScore, ScoreWeights, CUSTOM_WEIGHT_PREFIX};
