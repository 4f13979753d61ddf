//! Keyword retrieval: rank, normalize, filter, materialize, truncate.

pub mod composer;
pub mod retriever;

pub use retriever::{KeywordRetriever, QueryOptions};
