use crate::error::Result;
use crate::types::{IndexEntry, IndexOp, KeywordQuery, RawMatch};

/// A full-text ranking index that shadows the document table.
///
/// Every commit records a sync generation alongside the operations; the
/// document table records the same number, so a mismatch on open reveals
/// an index that committed without its table (or the reverse).
pub trait RankingIndex: Send + Sync {
    /// Apply `ops` as one unit and record `generation`. On error none of the
    /// operations may be visible to later searches.
    fn apply(&self, ops: &[IndexOp], generation: u64) -> Result<()>;

    /// Replace every entry with the entries yielded by `pages`, committing
    /// once at the end. On error the previous contents stay in place.
    fn replace_all(&self, pages: &mut dyn Iterator<Item = Result<Vec<IndexEntry>>>, generation: u64) -> Result<u64>;

    /// Generation recorded by the last commit; 0 for a fresh index.
    fn generation(&self) -> Result<u64>;

    fn search(&self, query: &KeywordQuery) -> Result<Vec<RawMatch>>;
    fn entries(&self) -> Result<Vec<IndexEntry>>;
    fn num_entries(&self) -> Result<u64>;

    fn clear(&self, generation: u64) -> Result<()> { self.replace_all(&mut std::iter::empty(), generation).map(|_| ()) }
}

impl<T: RankingIndex + ?Sized> RankingIndex for Box<T> {
    fn apply(&self, ops: &[IndexOp], generation: u64) -> Result<()> { (**self).apply(ops, generation) }
    fn replace_all(&self, pages: &mut dyn Iterator<Item = Result<Vec<IndexEntry>>>, generation: u64) -> Result<u64> {
        (**self).replace_all(pages, generation)
    }
    fn generation(&self) -> Result<u64> { (**self).generation() }
    fn search(&self, query: &KeywordQuery) -> Result<Vec<RawMatch>> { (**self).search(query) }
    fn entries(&self) -> Result<Vec<IndexEntry>> { (**self).entries() }
    fn num_entries(&self) -> Result<u64> { (**self).num_entries() }
}
