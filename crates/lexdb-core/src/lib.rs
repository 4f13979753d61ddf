//! lexdb-core
//!
//! Shared vocabulary of the document store: documents and index entries,
//! the error taxonomy, the `RankingIndex` seam, metadata filter trees,
//! score normalization and configuration.
#![deny(unused_imports)]
#![deny(unused_variables)]

pub mod config;
pub mod data_processor;
pub mod error;
pub mod filter;
pub mod score;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
