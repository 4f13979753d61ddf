//! Domain types shared by the store, the ranking index and the composer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type DocumentId = String;
pub type Meta = BTreeMap<String, Value>;

/// Namespace used when neither the caller nor the config names one.
pub const DEFAULT_NAMESPACE: &str = "document";

/// Kind of payload carried in `Document::content`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Table,
    Image,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "table" => Ok(ContentType::Table),
            "image" => Ok(ContentType::Image),
            other => Err(Error::InvalidInput(format!("unknown content type '{}'", other))),
        }
    }
}

/// A stored document.
///
/// - `id`: unique within `namespace`
/// - `content`: the text that is mirrored into the ranking index
/// - `vector_id`: optional link into an external embedding store
/// - `meta`: filterable fields; scalars and lists of scalars
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub vector_id: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub meta: Meta,
}

fn default_namespace() -> String { DEFAULT_NAMESPACE.to_string() }

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            content_type: ContentType::Text,
            vector_id: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            meta: Meta::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self { self.namespace = namespace.into(); self }

    pub fn with_meta(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(field.into(), value.into());
        self
    }

    pub fn with_vector_id(mut self, vector_id: impl Into<String>) -> Self { self.vector_id = Some(vector_id.into()); self }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self { self.content_type = content_type; self }
}

/// Shadow tuple held by the ranking index for one live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub row: u64,
    pub id: DocumentId,
    pub namespace: String,
    pub content: String,
}

/// A single mutation of the ranking index derived from a table mutation.
///
/// `Remove` carries the full old entry so the operation can be inverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    Insert(IndexEntry),
    Remove(IndexEntry),
}

impl IndexOp {
    pub fn inverse(&self) -> IndexOp {
        match self {
            IndexOp::Insert(e) => IndexOp::Remove(e.clone()),
            IndexOp::Remove(e) => IndexOp::Insert(e.clone()),
        }
    }

    /// Operations that undo `ops` when applied after them: inverses in reverse order.
    pub fn undo(ops: &[IndexOp]) -> Vec<IndexOp> { ops.iter().rev().map(IndexOp::inverse).collect() }
}

/// Keyword query handed to a ranking index.
#[derive(Debug, Clone)]
pub struct KeywordQuery {
    pub text: String,
    pub namespace: String,
    pub all_terms_must_match: bool,
}

/// One ranked hit. `score` is raw and higher is always better; it is only
/// comparable with scores from the same query execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub id: DocumentId,
    pub score: f64,
}

/// A document returned from a query together with its (possibly scaled) score.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDocument {
    pub document: Document,
    pub score: f64,
}

/// What to do when a written document id already exists in its namespace.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    Skip,
    #[default]
    Overwrite,
    Fail,
}

impl FromStr for DuplicatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(DuplicatePolicy::Skip),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            "fail" => Ok(DuplicatePolicy::Fail),
            other => Err(Error::InvalidConfig(format!("unknown duplicate policy '{}'", other))),
        }
    }
}

/// Restricts materialized documents by whether they carry a vector id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VectorPresence {
    #[default]
    Any,
    With,
    Without,
}

impl VectorPresence {
    pub fn admits(self, vector_id: Option<&str>) -> bool {
        match self {
            VectorPresence::Any => true,
            VectorPresence::With => vector_id.is_some(),
            VectorPresence::Without => vector_id.is_none(),
        }
    }
}
