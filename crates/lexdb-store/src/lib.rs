//! redb-backed document store with a synchronized ranking index.
//!
//! Documents and their metadata live in redb tables; every mutation goes
//! through [`sync::IndexSynchronizer`] so the ranking index always mirrors
//! the committed table.

#![deny(unused_imports)]

pub mod materializer;
pub mod store;
pub mod sync;
mod tables;

pub use materializer::{DocumentBatches, DocumentQuery, Documents, DEFAULT_BATCH_SIZE};
pub use store::{DocumentStore, WriteSummary};
pub use sync::{ConsistencyReport, IndexSynchronizer, Mutation, WriteOutcome};
pub use lexdb_text::TantivyRankingIndex;
