//! Stored rows

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::value::Value;

/// Row identifier, unique and never reused within a table
pub type RowId = u64;

/// Column name to value, in schema order
pub type Record = IndexMap<String, Value>;

/// A row in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub data: Record,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    /// Create a freshly inserted row
    pub fn new(row_id: RowId, data: Record) -> Self {
        let now = Utc::now();
        Self {
            row_id,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a column value; absent columns read as NULL
    pub fn get(&self, column: &str) -> &Value {
        self.data.get(column).unwrap_or(&Value::Null)
    }
}
