// Row trait shared by every table the store holds

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row that can live in one of the store's tables
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Primary key of the row
    fn id(&self) -> &str;

    /// Version timestamp in milliseconds since epoch
    ///
    /// The JSONL log keeps the line with the highest value per id.
    fn updated_at(&self) -> i64;

    /// Table this row belongs to (e.g. "thesis_submissions")
    /// Determines the JSONL filename: {table}.jsonl
    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Columns the store indexes for filtering and ordering
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        HashMap::new()
    }
}

/// Value types that can be indexed
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::String(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::String(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Int(i) => write!(f, "{}", i),
            IndexValue::Bool(b) => write!(f, "{}", b),
        }
    }
}
