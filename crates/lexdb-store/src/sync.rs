//! Index Synchronizer: the single write path for documents.
//!
//! Every mutation runs inside [`IndexSynchronizer::run`]: table changes are
//! staged in one redb write transaction while the matching ranking-index
//! operations are collected; the index applies them as one unit and only
//! then is the table committed. If the index refuses, the transaction is
//! aborted. If the table commit fails after the index accepted, the inverse
//! operations are applied to the index.
//!
//! Both sides record a sync generation with each such commit. A crash
//! between the two commits leaves the generations unequal, which the store
//! detects on open.

use redb::{Database, ReadableTable, WriteTransaction};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use lexdb_core::error::{Error, Result};
use lexdb_core::filter::FilterNode;
use lexdb_core::traits::RankingIndex;
use lexdb_core::types::{Document, DuplicatePolicy, IndexEntry, IndexOp, Meta};

use crate::tables::{
    bump_generation, next_row, read_generation, read_meta, read_row, remove_meta, scan_all, scan_namespace, storage_err,
    write_meta, StoredRow, COUNTERS, DOCUMENTS, METADATA,
};

/// Result of writing a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Staged table changes plus the index operations they imply.
pub struct Mutation {
    txn: WriteTransaction,
    ops: Vec<IndexOp>,
}

impl Mutation {
    /// Insert or, depending on `policy`, overwrite one document.
    pub fn put(&mut self, doc: &Document, namespace: &str, policy: DuplicatePolicy) -> Result<WriteOutcome> {
        if doc.id.is_empty() {
            return Err(Error::InvalidInput("document id must not be empty".into()));
        }
        let id = doc.id.as_str();
        let mut table = self.txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let (row, outcome) = match read_row(&table, namespace, id)? {
            Some(old) => match policy {
                DuplicatePolicy::Skip => return Ok(WriteOutcome::Skipped),
                DuplicatePolicy::Fail => {
                    return Err(Error::DuplicateDocument { id: id.to_string(), namespace: namespace.to_string() })
                }
                DuplicatePolicy::Overwrite => {
                    self.ops.push(IndexOp::Remove(old.index_entry(namespace, id)));
                    (old.row, WriteOutcome::Updated)
                }
            },
            None => (next_row(&self.txn)?, WriteOutcome::Inserted),
        };
        let stored = StoredRow { row, content: doc.content.clone(), content_type: doc.content_type, vector_id: doc.vector_id.clone() };
        table.insert((namespace, id), stored.encode()?.as_slice()).map_err(storage_err)?;
        drop(table);
        write_meta(&self.txn, namespace, id, &doc.meta)?;
        self.ops.push(IndexOp::Insert(stored.index_entry(namespace, id)));
        Ok(outcome)
    }

    /// Remove one document and its metadata. Returns whether it existed.
    pub fn delete(&mut self, namespace: &str, id: &str) -> Result<bool> {
        let mut table = self.txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let removed = match table.remove((namespace, id)).map_err(storage_err)? {
            Some(guard) => Some(StoredRow::decode(guard.value())?),
            None => None,
        };
        drop(table);
        let Some(old) = removed else { return Ok(false) };
        remove_meta(&self.txn, namespace, id)?;
        self.ops.push(IndexOp::Remove(old.index_entry(namespace, id)));
        Ok(true)
    }

    /// Replace a document's metadata. Content is untouched, so the index is too.
    pub fn set_meta(&mut self, namespace: &str, id: &str, meta: &Meta) -> Result<bool> {
        let table = self.txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let exists = read_row(&table, namespace, id)?.is_some();
        drop(table);
        if exists { write_meta(&self.txn, namespace, id, meta)?; }
        Ok(exists)
    }

    pub fn set_vector_id(&mut self, namespace: &str, id: &str, vector_id: Option<String>) -> Result<bool> {
        let mut table = self.txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let Some(mut row) = read_row(&table, namespace, id)? else { return Ok(false) };
        row.vector_id = vector_id;
        table.insert((namespace, id), row.encode()?.as_slice()).map_err(storage_err)?;
        Ok(true)
    }

    /// Ids in `namespace`, optionally restricted to those whose metadata
    /// satisfies `filter`, as seen by this transaction.
    pub fn ids(&self, namespace: &str, filter: Option<&FilterNode>) -> Result<Vec<String>> {
        let docs = self.txn.open_table(DOCUMENTS).map_err(storage_err)?;
        let meta = self.txn.open_table(METADATA).map_err(storage_err)?;
        let mut ids = Vec::new();
        for (id, _) in scan_namespace(&docs, namespace, None, usize::MAX)? {
            if let Some(filter) = filter {
                if !filter.matches(&read_meta(&meta, namespace, &id)?) { continue; }
            }
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Entries that disagree between the document table and the ranking index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// (namespace, id) of documents with no index entry.
    pub missing: Vec<(String, String)>,
    /// Index entries with no live document, or duplicated rows.
    pub orphaned: Vec<IndexEntry>,
    /// (namespace, id) of documents whose entry differs from the table.
    pub stale: Vec<(String, String)>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool { self.missing.is_empty() && self.orphaned.is_empty() && self.stale.is_empty() }
}

pub struct IndexSynchronizer<I> {
    index: I,
    write_lock: Mutex<()>,
}

impl<I: RankingIndex> IndexSynchronizer<I> {
    pub fn new(index: I) -> Self { Self { index, write_lock: Mutex::new(()) } }

    pub fn index(&self) -> &I { &self.index }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| Error::Storage("write lock poisoned".into()))
    }

    /// Run `f` against a fresh write transaction and commit table and index together.
    ///
    /// A mutation that touches the index advances the sync generation on
    /// both sides.
    pub fn run<T>(&self, db: &Database, f: impl FnOnce(&mut Mutation) -> Result<T>) -> Result<T> {
        let _guard = self.lock()?;
        let txn = db.begin_write().map_err(storage_err)?;
        let mut mutation = Mutation { txn, ops: Vec::new() };
        let out = f(&mut mutation)?;
        let Mutation { txn, ops } = mutation;
        if ops.is_empty() {
            txn.commit().map_err(storage_err)?;
            return Ok(out);
        }

        let (previous, generation) = bump_generation(&txn)?;
        if let Err(e) = self.index.apply(&ops, generation) {
            warn!(error = %e, ops = ops.len(), "index sync failed; aborting document mutation");
            if let Err(abort) = txn.abort() { warn!(error = %abort, "transaction abort failed"); }
            return Err(e);
        }
        if let Err(e) = txn.commit() {
            if let Err(undo) = self.index.apply(&IndexOp::undo(&ops), previous) {
                error!(error = %undo, generation, "could not revert index after failed commit; rebuild_index is required");
            }
            return Err(storage_err(e));
        }
        debug!(ops = ops.len(), generation, "mutation committed");
        Ok(out)
    }

    /// Sync generation of the table and of the index.
    pub fn generations(&self, db: &Database) -> Result<(u64, u64)> {
        let txn = db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(COUNTERS).map_err(storage_err)?;
        Ok((read_generation(&table)?, self.index.generation()?))
    }

    /// Compare every live document with the index entries.
    pub fn verify(&self, db: &Database) -> Result<ConsistencyReport> {
        let _guard = self.lock()?;
        let mut report = ConsistencyReport::default();
        let mut by_row: HashMap<u64, IndexEntry> = HashMap::new();
        for entry in self.index.entries()? {
            if let Some(dup) = by_row.insert(entry.row, entry) { report.orphaned.push(dup); }
        }

        let txn = db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(DOCUMENTS).map_err(storage_err)?;
        for item in table.iter().map_err(storage_err)? {
            let (key, value) = item.map_err(storage_err)?;
            let (namespace, id) = key.value();
            let expected = StoredRow::decode(value.value())?.index_entry(namespace, id);
            match by_row.remove(&expected.row) {
                None => report.missing.push((namespace.to_string(), id.to_string())),
                Some(found) if found != expected => report.stale.push((namespace.to_string(), id.to_string())),
                Some(_) => {}
            }
        }
        report.orphaned.extend(by_row.into_values());
        Ok(report)
    }

    /// Refill the index from the table, one page at a time, and commit once.
    /// The previous index stays live until that commit.
    pub fn rebuild(&self, db: &Database, batch_size: usize) -> Result<u64> {
        let _guard = self.lock()?;
        let batch_size = batch_size.max(1);
        let generation = {
            let txn = db.begin_read().map_err(storage_err)?;
            let table = txn.open_table(COUNTERS).map_err(storage_err)?;
            read_generation(&table)?
        };

        let mut cursor: Option<(String, String)> = None;
        let mut done = false;
        let mut pages = std::iter::from_fn(|| {
            if done { return None; }
            let page = match read_page(db, cursor.as_ref(), batch_size) {
                Ok(page) => page,
                Err(e) => {
                    done = true;
                    return Some(Err(e));
                }
            };
            if page.len() < batch_size { done = true; }
            let (ns, id, _) = page.last()?;
            cursor = Some((ns.clone(), id.clone()));
            Some(Ok(page.iter().map(|(ns, id, row)| row.index_entry(ns, id)).collect()))
        });
        let total = self.index.replace_all(&mut pages, generation)?;
        info!(entries = total, generation, "ranking index rebuilt");
        Ok(total)
    }
}

fn read_page(db: &Database, after: Option<&(String, String)>, limit: usize) -> Result<Vec<(String, String, StoredRow)>> {
    let txn = db.begin_read().map_err(storage_err)?;
    let table = txn.open_table(DOCUMENTS).map_err(storage_err)?;
    scan_all(&table, after.map(|(ns, id)| (ns.as_str(), id.as_str())), limit)
}
