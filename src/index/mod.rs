//! Full-text indexing
//!
//! `tokenizer` turns text into index terms; `Indexer` keeps the inverted
//! index and produces scored search candidates.

mod inverted;
pub mod tokenizer;

pub use inverted::{IndexField, IndexStats, Indexer, Posting, SearchCandidate};
