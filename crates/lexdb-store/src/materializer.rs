//! Batched, keyset-paginated document materialization.
//!
//! Each page runs in its own read transaction: primary rows are fetched
//! first (by range scan, or by point lookups over a sorted allow-list), then
//! the metadata of exactly those rows is loaded in a second bounded lookup.
//! The next page starts strictly after the last identifier seen, so pages
//! never overlap or skip rows regardless of writes between pages.

use redb::Database;
use serde_json::Value;
use std::collections::HashSet;
use std::vec;

use lexdb_core::error::Result;
use lexdb_core::filter::{compile, FilterNode};
use lexdb_core::types::{Document, VectorPresence};

use crate::tables::{read_meta, read_row, scan_namespace, storage_err, StoredRow, DOCUMENTS, METADATA};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// What to materialize. Built with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    pub namespace: Option<String>,
    pub ids: Option<Vec<String>>,
    pub filter: Option<FilterNode>,
    pub vector_presence: VectorPresence,
    pub vector_ids: Option<HashSet<String>>,
    pub batch_size: Option<usize>,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self { namespace: None, ids: None, filter: None, vector_presence: VectorPresence::Any, vector_ids: None, batch_size: None }
    }
}

impl DocumentQuery {
    pub fn new() -> Self { Self::default() }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self { self.namespace = Some(namespace.into()); self }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filter(mut self, filter: FilterNode) -> Self { self.filter = Some(filter); self }

    /// Compile and attach a JSON filter tree.
    pub fn with_filters(self, filters: &Value) -> Result<Self> { Ok(self.with_filter(compile(filters)?)) }

    pub fn with_vector_presence(mut self, presence: VectorPresence) -> Self { self.vector_presence = presence; self }

    pub fn with_vector_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vector_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self { self.batch_size = Some(batch_size); self }

    fn admits_row(&self, row: &StoredRow) -> bool {
        let vector_id = row.vector_id.as_deref();
        if !self.vector_presence.admits(vector_id) { return false; }
        match (&self.vector_ids, vector_id) {
            (None, _) => true,
            (Some(allowed), Some(v)) => allowed.contains(v),
            (Some(_), None) => false,
        }
    }
}

enum Source {
    Scan,
    AllowList(Vec<String>),
}

/// Lazy sequence of non-empty document pages.
pub struct DocumentBatches<'s> {
    db: &'s Database,
    namespace: String,
    query: DocumentQuery,
    source: Source,
    batch_size: usize,
    cursor: Option<String>,
    done: bool,
}

impl<'s> DocumentBatches<'s> {
    pub(crate) fn new(db: &'s Database, namespace: String, mut query: DocumentQuery, batch_size: usize) -> Self {
        let source = match query.ids.take() {
            Some(mut ids) => {
                ids.sort();
                ids.dedup();
                Source::AllowList(ids)
            }
            None => Source::Scan,
        };
        let done = matches!(&source, Source::AllowList(ids) if ids.is_empty());
        Self { db, namespace, query, source, batch_size: batch_size.max(1), cursor: None, done }
    }

    fn fetch_page(&mut self) -> Result<Option<Vec<Document>>> {
        while !self.done {
            let txn = self.db.begin_read().map_err(storage_err)?;
            let docs_table = txn.open_table(DOCUMENTS).map_err(storage_err)?;

            let rows = match &self.source {
                Source::Scan => {
                    let rows = scan_namespace(&docs_table, &self.namespace, self.cursor.as_deref(), self.batch_size)?;
                    if rows.len() < self.batch_size { self.done = true; }
                    if let Some((last, _)) = rows.last() { self.cursor = Some(last.clone()); }
                    rows
                }
                Source::AllowList(ids) => {
                    let start = match &self.cursor {
                        Some(last) => ids.partition_point(|id| id.as_str() <= last.as_str()),
                        None => 0,
                    };
                    let end = (start + self.batch_size).min(ids.len());
                    if end >= ids.len() { self.done = true; }
                    let page = &ids[start..end];
                    let mut rows = Vec::with_capacity(page.len());
                    for id in page {
                        if let Some(row) = read_row(&docs_table, &self.namespace, id)? { rows.push((id.clone(), row)); }
                    }
                    if let Some(last) = page.last() { self.cursor = Some(last.clone()); }
                    rows
                }
            };

            let meta_table = txn.open_table(METADATA).map_err(storage_err)?;
            let mut docs = Vec::with_capacity(rows.len());
            for (id, row) in rows {
                if !self.query.admits_row(&row) { continue; }
                let meta = read_meta(&meta_table, &self.namespace, &id)?;
                if let Some(filter) = &self.query.filter {
                    if !filter.matches(&meta) { continue; }
                }
                docs.push(row.into_document(&self.namespace, &id, meta));
            }
            if !docs.is_empty() { return Ok(Some(docs)); }
        }
        Ok(None)
    }
}

impl Iterator for DocumentBatches<'_> {
    type Item = Result<Vec<Document>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fetch_page() {
            Ok(page) => page.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Documents one at a time, fetched a page at a time.
pub struct Documents<'s> {
    batches: DocumentBatches<'s>,
    current: vec::IntoIter<Document>,
}

impl<'s> Documents<'s> {
    pub(crate) fn new(batches: DocumentBatches<'s>) -> Self { Self { batches, current: Vec::new().into_iter() } }
}

impl Iterator for Documents<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.current.next() { return Some(Ok(doc)); }
            match self.batches.next()? {
                Ok(page) => self.current = page.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
