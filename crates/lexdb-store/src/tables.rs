//! redb table layout and row codecs.
//!
//! # Tables
//!
//! - `documents`: (namespace, id) -> StoredRow (JSON)
//! - `metadata`: (namespace, id, field) -> value (JSON)
//! - `counters`: name -> u64, holds the row-position allocator and the sync
//!   generation shared with the ranking index

use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::ops::Bound;

use lexdb_core::error::{Error, Result};
use lexdb_core::types::{ContentType, Document, IndexEntry, Meta};

pub(crate) type DocKey = (&'static str, &'static str);
pub(crate) type MetaKey = (&'static str, &'static str, &'static str);
pub(crate) type Bytes = &'static [u8];

pub(crate) const DOCUMENTS: TableDefinition<DocKey, Bytes> = TableDefinition::new("documents");
pub(crate) const METADATA: TableDefinition<MetaKey, Bytes> = TableDefinition::new("metadata");
pub(crate) const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const NEXT_ROW: &str = "next_row";
const SYNC_GENERATION: &str = "sync_generation";

pub(crate) fn storage_err<E: std::fmt::Display>(e: E) -> Error { Error::Storage(e.to_string()) }

/// Primary-table payload. The key carries namespace and id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRow {
    pub row: u64,
    pub content: String,
    pub content_type: ContentType,
    pub vector_id: Option<String>,
}

impl StoredRow {
    pub fn encode(&self) -> Result<Vec<u8>> { Ok(serde_json::to_vec(self)?) }

    pub fn decode(bytes: &[u8]) -> Result<Self> { Ok(serde_json::from_slice(bytes)?) }

    pub fn into_document(self, namespace: &str, id: &str, meta: Meta) -> Document {
        Document {
            id: id.to_string(),
            content: self.content,
            content_type: self.content_type,
            vector_id: self.vector_id,
            namespace: namespace.to_string(),
            meta,
        }
    }

    pub fn index_entry(&self, namespace: &str, id: &str) -> IndexEntry {
        IndexEntry { row: self.row, id: id.to_string(), namespace: namespace.to_string(), content: self.content.clone() }
    }
}

pub(crate) fn read_row(table: &impl ReadableTable<DocKey, Bytes>, namespace: &str, id: &str) -> Result<Option<StoredRow>> {
    match table.get((namespace, id)).map_err(storage_err)? {
        Some(guard) => Ok(Some(StoredRow::decode(guard.value())?)),
        None => Ok(None),
    }
}

/// Up to `limit` rows of `namespace` with ids strictly after `after`, in id order.
pub(crate) fn scan_namespace(
    table: &impl ReadableTable<DocKey, Bytes>,
    namespace: &str,
    after: Option<&str>,
    limit: usize,
) -> Result<Vec<(String, StoredRow)>> {
    let lower = match after {
        Some(last) => Bound::Excluded((namespace, last)),
        None => Bound::Included((namespace, "")),
    };
    let mut rows = Vec::with_capacity(limit.min(1024));
    for item in table.range((lower, Bound::Unbounded)).map_err(storage_err)? {
        let (key, value) = item.map_err(storage_err)?;
        let (ns, id) = key.value();
        if ns != namespace { break; }
        rows.push((id.to_string(), StoredRow::decode(value.value())?));
        if rows.len() >= limit { break; }
    }
    Ok(rows)
}

/// Up to `limit` rows of any namespace strictly after `after` in key order.
pub(crate) fn scan_all(
    table: &impl ReadableTable<DocKey, Bytes>,
    after: Option<(&str, &str)>,
    limit: usize,
) -> Result<Vec<(String, String, StoredRow)>> {
    let lower = match after {
        Some(key) => Bound::Excluded(key),
        None => Bound::Unbounded,
    };
    let mut rows = Vec::with_capacity(limit.min(1024));
    for item in table.range((lower, Bound::Unbounded)).map_err(storage_err)? {
        let (key, value) = item.map_err(storage_err)?;
        let (ns, id) = key.value();
        rows.push((ns.to_string(), id.to_string(), StoredRow::decode(value.value())?));
        if rows.len() >= limit { break; }
    }
    Ok(rows)
}

pub(crate) fn read_meta(table: &impl ReadableTable<MetaKey, Bytes>, namespace: &str, id: &str) -> Result<Meta> {
    let mut meta = Meta::new();
    for item in table.range((Bound::Included((namespace, id, "")), Bound::Unbounded)).map_err(storage_err)? {
        let (key, value) = item.map_err(storage_err)?;
        let (ns, doc_id, field) = key.value();
        if ns != namespace || doc_id != id { break; }
        meta.insert(field.to_string(), serde_json::from_slice(value.value())?);
    }
    Ok(meta)
}

/// Replace every metadata field of one document.
pub(crate) fn write_meta(txn: &WriteTransaction, namespace: &str, id: &str, meta: &Meta) -> Result<()> {
    remove_meta(txn, namespace, id)?;
    let mut table = txn.open_table(METADATA).map_err(storage_err)?;
    for (field, value) in meta {
        let bytes = serde_json::to_vec(value)?;
        table.insert((namespace, id, field.as_str()), bytes.as_slice()).map_err(storage_err)?;
    }
    Ok(())
}

pub(crate) fn remove_meta(txn: &WriteTransaction, namespace: &str, id: &str) -> Result<()> {
    let mut table = txn.open_table(METADATA).map_err(storage_err)?;
    let fields: Vec<String> = read_meta(&table, namespace, id)?.into_keys().collect();
    for field in &fields {
        table.remove((namespace, id, field.as_str())).map_err(storage_err)?;
    }
    Ok(())
}

/// Allocate the next row position. Positions are never reused.
pub(crate) fn next_row(txn: &WriteTransaction) -> Result<u64> {
    let mut table = txn.open_table(COUNTERS).map_err(storage_err)?;
    let current = table.get(NEXT_ROW).map_err(storage_err)?.map(|g| g.value()).unwrap_or(1);
    table.insert(NEXT_ROW, current + 1).map_err(storage_err)?;
    Ok(current)
}

pub(crate) fn read_generation(table: &impl ReadableTable<&'static str, u64>) -> Result<u64> {
    Ok(table.get(SYNC_GENERATION).map_err(storage_err)?.map(|g| g.value()).unwrap_or(0))
}

/// Advance the sync generation, returning (previous, new).
pub(crate) fn bump_generation(txn: &WriteTransaction) -> Result<(u64, u64)> {
    let mut table = txn.open_table(COUNTERS).map_err(storage_err)?;
    let previous = read_generation(&table)?;
    table.insert(SYNC_GENERATION, previous + 1).map_err(storage_err)?;
    Ok((previous, previous + 1))
}
