//! Metadata filter trees.
//!
//! Filters arrive as nested JSON mappings and are compiled once into a
//! [`FilterNode`] AST. The AST only ever looks at a document's metadata map;
//! it has no access to content or storage.
//!
//! Accepted shapes:
//!
//! ```json
//! {
//!   "type": "article",
//!   "date": {"$gte": "2015-01-01", "$lt": "2021-01-01"},
//!   "$or": {"genre": ["economy", "politics"], "publisher": "nytimes"}
//! }
//! ```
//!
//! Keys are either logical operators (`$and`, `$or`, `$not`) or field names.
//! A field maps to a mapping of comparison operators, a list (implicit `$in`)
//! or a scalar (implicit `$eq`). Several keys in one mapping combine with an
//! implicit AND. Logical operators take a mapping or a list of mappings.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::types::Meta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    Nin,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => CompareOp::Eq,
            "$ne" => CompareOp::Ne,
            "$in" => CompareOp::In,
            "$nin" => CompareOp::Nin,
            "$gt" => CompareOp::Gt,
            "$gte" => CompareOp::Gte,
            "$lt" => CompareOp::Lt,
            "$lte" => CompareOp::Lte,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    /// Negation of the conjunction of its children.
    Not(Vec<FilterNode>),
    Compare { field: String, op: CompareOp, value: Value },
}

/// Compile a JSON filter tree. Malformed trees are rejected with
/// [`Error::InvalidFilter`].
pub fn compile(filter: &Value) -> Result<FilterNode> {
    let map = filter
        .as_object()
        .ok_or_else(|| Error::InvalidFilter(format!("filter must be a mapping, got {}", filter)))?;
    let mut conditions = parse_mapping(map)?;
    if conditions.len() == 1 {
        if let Some(only) = conditions.pop() { return Ok(only); }
    }
    Ok(FilterNode::And(conditions))
}

fn parse_mapping(map: &Map<String, Value>) -> Result<Vec<FilterNode>> {
    let mut conditions = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => conditions.push(FilterNode::And(parse_children(key, value)?)),
            "$or" => conditions.push(FilterNode::Or(parse_children(key, value)?)),
            "$not" => conditions.push(FilterNode::Not(parse_children(key, value)?)),
            k if k.starts_with('$') => {
                return Err(Error::InvalidFilter(format!("operator '{}' is not valid at this level", k)))
            }
            field => conditions.extend(parse_comparison(field, value)?),
        }
    }
    Ok(conditions)
}

fn parse_children(op: &str, value: &Value) -> Result<Vec<FilterNode>> {
    match value {
        Value::Object(map) => parse_mapping(map),
        Value::Array(items) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                let map = item.as_object().ok_or_else(|| {
                    Error::InvalidFilter(format!("'{}' list entries must be mappings, got {}", op, item))
                })?;
                let mut inner = parse_mapping(map)?;
                if inner.len() == 1 {
                    children.extend(inner.pop());
                } else {
                    children.push(FilterNode::And(inner));
                }
            }
            Ok(children)
        }
        other => Err(Error::InvalidFilter(format!("'{}' takes a mapping or a list of mappings, got {}", op, other))),
    }
}

fn parse_comparison(field: &str, value: &Value) -> Result<Vec<FilterNode>> {
    match value {
        Value::Object(ops) => {
            if ops.is_empty() {
                return Err(Error::InvalidFilter(format!("field '{}' has an empty comparison", field)));
            }
            let mut leaves = Vec::with_capacity(ops.len());
            for (key, operand) in ops {
                let op = CompareOp::parse(key)
                    .ok_or_else(|| Error::InvalidFilter(format!("unknown comparison operator '{}' on '{}'", key, field)))?;
                validate_operand(field, op, operand)?;
                leaves.push(FilterNode::Compare { field: field.to_string(), op, value: operand.clone() });
            }
            Ok(leaves)
        }
        Value::Array(_) => Ok(vec![FilterNode::Compare { field: field.to_string(), op: CompareOp::In, value: value.clone() }]),
        _ => Ok(vec![FilterNode::Compare { field: field.to_string(), op: CompareOp::Eq, value: value.clone() }]),
    }
}

fn validate_operand(field: &str, op: CompareOp, operand: &Value) -> Result<()> {
    match op {
        CompareOp::In | CompareOp::Nin if !operand.is_array() => {
            Err(Error::InvalidFilter(format!("'{}' on '{}' needs a list", if op == CompareOp::In { "$in" } else { "$nin" }, field)))
        }
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte if !(operand.is_number() || operand.is_string()) => {
            Err(Error::InvalidFilter(format!("range comparison on '{}' needs a number or a string, got {}", field, operand)))
        }
        _ => Ok(()),
    }
}

impl FilterNode {
    /// Evaluate against one document's metadata.
    ///
    /// Comparisons against compound stored values (lists, objects) never
    /// match, and neither do comparisons against a missing field.
    pub fn matches(&self, meta: &Meta) -> bool {
        match self {
            FilterNode::And(children) => children.iter().all(|c| c.matches(meta)),
            FilterNode::Or(children) => children.iter().any(|c| c.matches(meta)),
            FilterNode::Not(children) => !children.iter().all(|c| c.matches(meta)),
            FilterNode::Compare { field, op, value } => {
                let Some(stored) = meta.get(field) else { return false };
                if stored.is_array() || stored.is_object() { return false; }
                compare(stored, *op, value)
            }
        }
    }
}

fn compare(stored: &Value, op: CompareOp, operand: &Value) -> bool {
    match op {
        CompareOp::Eq => scalar_eq(stored, operand),
        CompareOp::Ne => !scalar_eq(stored, operand),
        CompareOp::In => operand.as_array().is_some_and(|vs| vs.iter().any(|v| scalar_eq(stored, v))),
        CompareOp::Nin => operand.as_array().is_some_and(|vs| !vs.iter().any(|v| scalar_eq(stored, v))),
        CompareOp::Gt => scalar_cmp(stored, operand) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(scalar_cmp(stored, operand), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => scalar_cmp(stored, operand) == Some(Ordering::Less),
        CompareOp::Lte => matches!(scalar_cmp(stored, operand), Some(Ordering::Less | Ordering::Equal)),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn scalar_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
