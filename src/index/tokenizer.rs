//! Text tokenization shared by indexing, querying and keyword extraction
//!
//! Text is lowercased, split into letter-led `[a-z][a-z0-9_]*` tokens, and
//! stripped of stopwords and tokens shorter than three characters.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Tokens of this length or shorter are dropped
pub const MAX_DROPPED_LEN: usize = 2;

/// Common English words carrying no retrieval signal
pub const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "because",
    "been", "before", "being", "below", "between", "both", "but", "can", "cannot", "could", "did",
    "does", "doing", "don", "down", "during", "each", "either", "else", "every", "few", "for",
    "from", "further", "get", "had", "has", "have", "having", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "however", "into", "its", "itself", "just", "like", "may",
    "might", "more", "most", "must", "myself", "nor", "not", "now", "off", "once", "only", "other",
    "our", "ours", "ourselves", "out", "over", "own", "same", "shall", "she", "should", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "too", "under", "until", "upon", "very", "was",
    "were", "what", "when", "where", "whether", "which", "while", "who", "whom", "why", "will",
    "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z][a-z0-9_]*").expect("token pattern is valid"))
}

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Whether `word` is in the stopword list
pub fn is_stopword(word: &str) -> bool {
    stopwords().contains(word)
}

/// Split text into index terms, in order of appearance (duplicates kept).
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| t.len() > MAX_DROPPED_LEN && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Distinct terms of `text`, first occurrence order preserved.
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Up to `limit` distinct keywords of `text` in extraction order.
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut keywords = unique_terms(text);
    keywords.truncate(limit);
    keywords
}
