use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use lexdb_core::error::Result;
use lexdb_core::filter::compile;
use lexdb_core::score::normalize;
use lexdb_core::traits::RankingIndex;
use lexdb_core::types::{KeywordQuery, ResultDocument};
use lexdb_store::{DocumentQuery, DocumentStore, TantivyRankingIndex};

use crate::composer::TopK;

/// Parameters shared by [`KeywordRetriever::query`] and [`KeywordRetriever::query_batch`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Metadata filter tree in the `$and`/`$or`/`$not` dialect.
    pub filters: Option<Value>,
    /// Maximum number of results; 0 returns every match.
    pub top_k: usize,
    /// Defaults to the store's namespace.
    pub namespace: Option<String>,
    pub all_terms_must_match: bool,
    /// Squash raw scores into (0, 1).
    pub scale_score: bool,
    /// Accepted for compatibility; ignored.
    pub custom_query: Option<String>,
    /// Accepted for compatibility; ignored.
    pub headers: Option<BTreeMap<String, String>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            filters: None,
            top_k: 10,
            namespace: None,
            all_terms_must_match: false,
            scale_score: true,
            custom_query: None,
            headers: None,
        }
    }
}

impl QueryOptions {
    pub fn with_filters(mut self, filters: Value) -> Self { self.filters = Some(filters); self }

    pub fn with_top_k(mut self, top_k: usize) -> Self { self.top_k = top_k; self }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self { self.namespace = Some(namespace.into()); self }

    pub fn with_all_terms_must_match(mut self, all: bool) -> Self { self.all_terms_must_match = all; self }

    pub fn with_scale_score(mut self, scale: bool) -> Self { self.scale_score = scale; self }
}

/// Ranked keyword retrieval over a [`DocumentStore`].
pub struct KeywordRetriever<I: RankingIndex = TantivyRankingIndex> {
    store: DocumentStore<I>,
}

impl<I: RankingIndex> KeywordRetriever<I> {
    pub fn new(store: DocumentStore<I>) -> Self { Self { store } }

    pub fn store(&self) -> &DocumentStore<I> { &self.store }

    pub fn into_store(self) -> DocumentStore<I> { self.store }

    /// Documents matching `text` (and `opts.filters`), best first.
    pub fn query(&self, text: &str, opts: &QueryOptions) -> Result<Vec<ResultDocument>> {
        if opts.custom_query.is_some() {
            warn!("custom_query is not supported by the keyword retriever and is ignored");
        }
        if opts.headers.is_some() {
            warn!("headers are not supported by the keyword retriever and are ignored");
        }
        let filter = opts.filters.as_ref().map(compile).transpose()?;
        let namespace = opts.namespace.clone().unwrap_or_else(|| self.store.default_namespace().to_string());

        let ranked = self.store.rank(&KeywordQuery {
            text: text.to_string(),
            namespace: namespace.clone(),
            all_terms_must_match: opts.all_terms_must_match,
        })?;
        if ranked.is_empty() { return Ok(Vec::new()); }

        let scores: HashMap<String, f64> =
            ranked.into_iter().map(|m| (m.id, normalize(m.score, opts.scale_score))).collect();
        let mut docs = DocumentQuery::new().with_namespace(namespace).with_ids(scores.keys().cloned());
        if let Some(filter) = filter { docs = docs.with_filter(filter); }

        let mut top = TopK::new(opts.top_k);
        for doc in self.store.get_all_documents_iter(docs) {
            let document = doc?;
            let Some(&score) = scores.get(&document.id) else { continue };
            top.push(ResultDocument { document, score });
        }
        let results = top.into_sorted();
        debug!(query = %text, matched = scores.len(), returned = results.len(), "keyword query composed");
        Ok(results)
    }

    /// [`query`](Self::query) for each text, in order, with the same options.
    pub fn query_batch<S: AsRef<str>>(&self, texts: &[S], opts: &QueryOptions) -> Result<Vec<Vec<ResultDocument>>> {
        texts.iter().map(|text| self.query(text.as_ref(), opts)).collect()
    }
}
