use redb::{Database, ReadableTableMetadata};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use lexdb_core::config::{StoreSettings, StoreTarget};
use lexdb_core::error::{Error, Result};
use lexdb_core::filter::compile;
use lexdb_core::traits::RankingIndex;
use lexdb_core::types::{Document, DuplicatePolicy, KeywordQuery, Meta, RawMatch, VectorPresence};
use lexdb_text::TantivyRankingIndex;

use crate::materializer::{DocumentBatches, DocumentQuery, Documents};
use crate::sync::{ConsistencyReport, IndexSynchronizer, WriteOutcome};
use crate::tables::{read_meta, read_row, storage_err, COUNTERS, DOCUMENTS, METADATA};

const DB_FILE: &str = "documents.redb";
const INDEX_DIR: &str = "index";

/// Counts from one `write_documents` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Embedded document table with a synchronized ranking index.
pub struct DocumentStore<I: RankingIndex = TantivyRankingIndex> {
    db: Database,
    sync: IndexSynchronizer<I>,
    settings: StoreSettings,
}

impl DocumentStore<TantivyRankingIndex> {
    /// Open (or create) the store named by `settings.url`.
    pub fn open(settings: StoreSettings) -> Result<Self> {
        settings.validate()?;
        let index = match settings.target()? {
            StoreTarget::InMemory => TantivyRankingIndex::in_memory(settings.writer_memory_bytes)?,
            StoreTarget::Directory(dir) => {
                TantivyRankingIndex::ensure_index_exists(&dir.join(INDEX_DIR), settings.writer_memory_bytes)?
            }
        };
        Self::with_index(index, settings)
    }

    pub fn open_in_memory() -> Result<Self> { Self::open(StoreSettings::in_memory()) }
}

impl<I: RankingIndex> DocumentStore<I> {
    /// Open the document table named by `settings.url` and pair it with `index`.
    pub fn with_index(index: I, settings: StoreSettings) -> Result<Self> {
        settings.validate()?;
        let db = match settings.target()? {
            StoreTarget::InMemory => Database::builder()
                .create_with_backend(redb::backends::InMemoryBackend::new())
                .map_err(storage_err)?,
            StoreTarget::Directory(dir) => open_file_db(&dir)?,
        };
        let store = Self { db, sync: IndexSynchronizer::new(index), settings };
        store.ensure_index_exists()?;
        Ok(store)
    }

    /// Create the tables if absent and make sure the index mirrors them.
    /// Safe to call any number of times.
    pub fn ensure_index_exists(&self) -> Result<()> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        txn.open_table(DOCUMENTS).map_err(storage_err)?;
        txn.open_table(METADATA).map_err(storage_err)?;
        txn.open_table(COUNTERS).map_err(storage_err)?;
        txn.commit().map_err(storage_err)?;

        let rows = {
            let txn = self.db.begin_read().map_err(storage_err)?;
            let table = txn.open_table(DOCUMENTS).map_err(storage_err)?;
            table.len().map_err(storage_err)?
        };
        let entries = self.sync.index().num_entries()?;
        let (table_generation, index_generation) = self.sync.generations(&self.db)?;
        if rows != entries || table_generation != index_generation {
            warn!(
                rows,
                entries,
                table_generation,
                index_generation,
                "ranking index out of step with document table; rebuilding"
            );
            self.rebuild_index()?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &StoreSettings { &self.settings }

    pub fn default_namespace(&self) -> &str { &self.settings.namespace }

    pub fn index(&self) -> &I { self.sync.index() }

    /// Sync generation recorded by the table and by the index; equal when in step.
    pub fn sync_generations(&self) -> Result<(u64, u64)> { self.sync.generations(&self.db) }

    fn namespace<'a>(&'a self, namespace: Option<&'a str>) -> &'a str { namespace.unwrap_or(self.settings.namespace.as_str()) }

    /// Write `documents` in one transaction.
    ///
    /// An explicit `namespace` overrides each document's own. Within one call
    /// repeated ids behave as if written one after another.
    pub fn write_documents(
        &self,
        documents: &[Document],
        namespace: Option<&str>,
        policy: Option<DuplicatePolicy>,
    ) -> Result<WriteSummary> {
        if documents.is_empty() { return Ok(WriteSummary::default()); }
        let policy = policy.unwrap_or(self.settings.duplicate_documents);
        let summary = self.sync.run(&self.db, |m| {
            let mut summary = WriteSummary::default();
            for doc in documents {
                let ns = namespace.unwrap_or(doc.namespace.as_str());
                match m.put(doc, ns, policy)? {
                    WriteOutcome::Inserted => summary.inserted += 1,
                    WriteOutcome::Updated => summary.updated += 1,
                    WriteOutcome::Skipped => summary.skipped += 1,
                }
            }
            Ok(summary)
        })?;
        info!(inserted = summary.inserted, updated = summary.updated, skipped = summary.skipped, "documents written");
        Ok(summary)
    }

    pub fn get_document_by_id(&self, id: &str, namespace: Option<&str>) -> Result<Option<Document>> {
        let ns = self.namespace(namespace);
        let txn = self.db.begin_read().map_err(storage_err)?;
        let docs = txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let Some(row) = read_row(&docs, ns, id)? else { return Ok(None) };
        let meta_table = txn.open_table(METADATA).map_err(storage_err)?;
        let meta = read_meta(&meta_table, ns, id)?;
        Ok(Some(row.into_document(ns, id, meta)))
    }

    /// Documents for `ids`, in id order; absent ids are skipped.
    pub fn get_documents_by_id<S: AsRef<str>>(
        &self,
        ids: &[S],
        namespace: Option<&str>,
        batch_size: Option<usize>,
    ) -> Result<Vec<Document>> {
        let mut query = DocumentQuery::new().with_ids(ids.iter().map(|id| id.as_ref().to_string()));
        if let Some(ns) = namespace { query = query.with_namespace(ns); }
        if let Some(size) = batch_size { query = query.with_batch_size(size); }
        self.get_all_documents(query)
    }

    /// Lazy pages of documents selected by `query`.
    pub fn batches(&self, query: DocumentQuery) -> DocumentBatches<'_> {
        if query.filter.is_some() {
            warn!("metadata filters never match list or object values");
        }
        let namespace = query.namespace.clone().unwrap_or_else(|| self.settings.namespace.clone());
        let batch_size = query.batch_size.unwrap_or(self.settings.batch_size);
        DocumentBatches::new(&self.db, namespace, query, batch_size)
    }

    /// Lazy documents selected by `query`, one page in memory at a time.
    pub fn get_all_documents_iter(&self, query: DocumentQuery) -> Documents<'_> { Documents::new(self.batches(query)) }

    pub fn get_all_documents(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        self.get_all_documents_iter(query).collect()
    }

    pub fn get_document_count(
        &self,
        namespace: Option<&str>,
        filters: Option<&Value>,
        only_without_vector: bool,
    ) -> Result<u64> {
        let mut query = DocumentQuery::new();
        if let Some(ns) = namespace { query = query.with_namespace(ns); }
        if let Some(filters) = filters { query = query.with_filters(filters)?; }
        if only_without_vector { query = query.with_vector_presence(VectorPresence::Without); }
        let mut count = 0u64;
        for page in self.batches(query) {
            count += page?.len() as u64;
        }
        Ok(count)
    }

    /// Delete the documents of `namespace` selected by `ids` and `filters`.
    /// With neither, every document of the namespace goes.
    pub fn delete_documents(
        &self,
        namespace: Option<&str>,
        ids: Option<&[String]>,
        filters: Option<&Value>,
    ) -> Result<usize> {
        let ns = self.namespace(namespace);
        let filter = filters.map(compile).transpose()?;
        let deleted = self.sync.run(&self.db, |m| {
            let targets: Vec<String> = match (ids, &filter) {
                (Some(ids), None) => ids.to_vec(),
                (Some(ids), Some(f)) => {
                    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
                    m.ids(ns, Some(f))?.into_iter().filter(|id| wanted.contains(id.as_str())).collect()
                }
                (None, f) => m.ids(ns, f.as_ref())?,
            };
            let mut deleted = 0;
            for id in &targets {
                if m.delete(ns, id)? { deleted += 1; }
            }
            Ok(deleted)
        })?;
        info!(namespace = ns, deleted, "documents deleted");
        Ok(deleted)
    }

    /// Delete every document of `namespace`.
    pub fn delete_index(&self, namespace: &str) -> Result<usize> { self.delete_documents(Some(namespace), None, None) }

    /// Replace the metadata of one document. Content and index are untouched.
    pub fn update_document_meta(&self, id: &str, meta: &Meta, namespace: Option<&str>) -> Result<()> {
        let ns = self.namespace(namespace);
        let found = self.sync.run(&self.db, |m| m.set_meta(ns, id, meta))?;
        if !found {
            return Err(Error::NotFound(format!("document '{}' in namespace '{}'", id, ns)));
        }
        Ok(())
    }

    /// Attach vector ids to existing documents. Returns how many were updated.
    pub fn update_vector_ids(&self, vector_ids: &BTreeMap<String, String>, namespace: Option<&str>) -> Result<usize> {
        let ns = self.namespace(namespace);
        self.sync.run(&self.db, |m| {
            let mut updated = 0;
            for (id, vector_id) in vector_ids {
                if m.set_vector_id(ns, id, Some(vector_id.clone()))? {
                    updated += 1;
                } else {
                    warn!(id = %id, namespace = ns, "no document to attach vector id to");
                }
            }
            Ok(updated)
        })
    }

    /// Ranked (id, raw score) pairs for `query`, best first.
    pub fn rank(&self, query: &KeywordQuery) -> Result<Vec<RawMatch>> { self.sync.index().search(query) }

    pub fn verify_index(&self) -> Result<ConsistencyReport> {
        let report = self.sync.verify(&self.db)?;
        debug!(
            missing = report.missing.len(),
            orphaned = report.orphaned.len(),
            stale = report.stale.len(),
            "index verified"
        );
        Ok(report)
    }

    pub fn rebuild_index(&self) -> Result<u64> { self.sync.rebuild(&self.db, self.settings.batch_size) }
}

fn open_file_db(dir: &Path) -> Result<Database> {
    std::fs::create_dir_all(dir).map_err(storage_err)?;
    let path = dir.join(DB_FILE);
    let db = Database::create(&path).map_err(storage_err)?;
    info!(path = %path.display(), "document table ready");
    Ok(db)
}
