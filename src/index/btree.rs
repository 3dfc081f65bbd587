//! Ordered index for one column
//!
//! A simplified B-tree flattened to a single sorted level: a vector of
//! `(key, row ids)` entries kept in key order. Lookups binary-search the
//! vector; inserts shift the tail, which is linear in the worst case but
//! keeps range scans a contiguous slice walk.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::catalog::IndexDef;
use crate::error::{Error, Result};
use crate::storage::{Row, RowId, Value};

/// One key and the rows carrying it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: Value,
    pub row_ids: Vec<RowId>,
}

/// Sorted single-column index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BTreeIndex {
    pub name: String,
    pub column_name: String,
    pub unique: bool,
    #[serde(default)]
    pub primary: bool,
    entries: Vec<IndexEntry>,
}

/// Size figures for one index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub distinct_keys: usize,
    pub total_entries: usize,
}

impl BTreeIndex {
    /// Create an empty index
    pub fn new(name: impl Into<String>, column_name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            column_name: column_name.into(),
            unique,
            primary: false,
            entries: Vec::new(),
        }
    }

    /// Create an empty index matching a catalog descriptor
    pub fn from_def(def: &IndexDef) -> Self {
        let mut index = Self::new(&def.name, &def.column, def.unique);
        index.primary = def.primary;
        index
    }

    fn locate(&self, key: &Value) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.total_cmp(key))
    }

    /// Add `row_id` under `key`. NULL keys are not indexed.
    ///
    /// Fails on a unique index when the key already maps to another row.
    pub fn insert(&mut self, key: &Value, row_id: RowId) -> Result<()> {
        if key.is_null() {
            return Ok(());
        }

        match self.locate(key) {
            Ok(pos) => {
                let bucket = &mut self.entries[pos].row_ids;
                if bucket.contains(&row_id) {
                    return Ok(());
                }
                if self.unique {
                    return Err(Error::UniqueViolation {
                        index: self.name.clone(),
                        key: key.to_sql_literal(),
                    });
                }
                let at = bucket.partition_point(|id| *id < row_id);
                bucket.insert(at, row_id);
            }
            Err(pos) => self.entries.insert(
                pos,
                IndexEntry {
                    key: key.clone(),
                    row_ids: vec![row_id],
                },
            ),
        }
        Ok(())
    }

    /// Remove `row_id` from under `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &Value, row_id: RowId) -> bool {
        if key.is_null() {
            return false;
        }
        let Ok(pos) = self.locate(key) else {
            return false;
        };

        let bucket = &mut self.entries[pos].row_ids;
        let Some(at) = bucket.iter().position(|id| *id == row_id) else {
            return false;
        };
        bucket.remove(at);
        if bucket.is_empty() {
            self.entries.remove(pos);
        }
        true
    }

    /// Rows whose key equals `key`
    pub fn find_exact(&self, key: &Value) -> Vec<RowId> {
        if key.is_null() {
            return Vec::new();
        }
        match self.locate(key) {
            Ok(pos) => self.entries[pos].row_ids.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Rows whose key lies between the bounds, in ascending key order.
    /// A missing bound is open on that side.
    pub fn find_range(
        &self,
        low: Option<&Value>,
        high: Option<&Value>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Vec<RowId> {
        let start = match low {
            Some(low) => self.entries.partition_point(|e| match e.key.total_cmp(low) {
                Ordering::Less => true,
                Ordering::Equal => !low_inclusive,
                Ordering::Greater => false,
            }),
            None => 0,
        };
        let end = match high {
            Some(high) => self.entries.partition_point(|e| match e.key.total_cmp(high) {
                Ordering::Less => true,
                Ordering::Equal => high_inclusive,
                Ordering::Greater => false,
            }),
            None => self.entries.len(),
        };

        if start >= end {
            return Vec::new();
        }
        self.entries[start..end]
            .iter()
            .flat_map(|e| e.row_ids.iter().copied())
            .collect()
    }

    /// Replace the contents with keys taken from `rows`.
    /// On a unique violation the index is left unchanged.
    pub fn rebuild(&mut self, rows: &[Row]) -> Result<()> {
        let mut fresh = Self::new(&self.name, &self.column_name, self.unique);
        for row in rows {
            fresh.insert(row.get(&self.column_name), row.row_id)?;
        }
        self.entries = fresh.entries;
        Ok(())
    }

    /// All entries in key order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            distinct_keys: self.entries.len(),
            total_entries: self.entries.iter().map(|e| e.row_ids.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Record;

    fn key(i: i64) -> Value {
        Value::Integer(i)
    }

    #[test]
    fn test_insert_and_find_exact() {
        let mut index = BTreeIndex::new("idx_age", "age", false);
        index.insert(&key(30), 1).unwrap();
        index.insert(&key(25), 2).unwrap();
        index.insert(&key(30), 3).unwrap();

        assert_eq!(index.find_exact(&key(30)), vec![1, 3]);
        assert_eq!(index.find_exact(&key(25)), vec![2]);
        assert!(index.find_exact(&key(99)).is_empty());
        assert_eq!(index.stats().distinct_keys, 2);
        assert_eq!(index.stats().total_entries, 3);
    }

    #[test]
    fn test_unique_violation() {
        let mut index = BTreeIndex::new("pk_users", "id", true);
        index.insert(&key(1), 10).unwrap();

        let err = index.insert(&key(1), 11).unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { .. }));
        // same row again is a no-op
        index.insert(&key(1), 10).unwrap();
        assert_eq!(index.find_exact(&key(1)), vec![10]);
    }

    #[test]
    fn test_null_keys_not_indexed() {
        let mut index = BTreeIndex::new("uq_email", "email", true);
        index.insert(&Value::Null, 1).unwrap();
        index.insert(&Value::Null, 2).unwrap();

        assert!(index.entries().is_empty());
        assert!(index.find_exact(&Value::Null).is_empty());
    }

    #[test]
    fn test_delete() {
        let mut index = BTreeIndex::new("idx", "n", false);
        index.insert(&key(5), 1).unwrap();
        index.insert(&key(5), 2).unwrap();

        assert!(index.delete(&key(5), 1));
        assert!(!index.delete(&key(5), 1));
        assert_eq!(index.find_exact(&key(5)), vec![2]);
        assert!(index.delete(&key(5), 2));
        assert!(index.entries().is_empty());
    }

    #[test]
    fn test_find_range() {
        let mut index = BTreeIndex::new("idx", "n", false);
        for (i, k) in [50, 10, 40, 20, 30].iter().enumerate() {
            index.insert(&key(*k), i as RowId + 1).unwrap();
        }
        // keys 10..=50 map to ids 2,4,5,3,1 in key order

        assert_eq!(
            index.find_range(Some(&key(20)), Some(&key(40)), true, true),
            vec![4, 5, 3]
        );
        assert_eq!(
            index.find_range(Some(&key(20)), Some(&key(40)), false, false),
            vec![5]
        );
        assert_eq!(index.find_range(None, Some(&key(20)), true, false), vec![2]);
        assert_eq!(index.find_range(Some(&key(45)), None, true, true), vec![1]);
        assert!(index
            .find_range(Some(&key(40)), Some(&key(20)), true, true)
            .is_empty());
    }

    #[test]
    fn test_rebuild() {
        let rows: Vec<Row> = [(1, "a"), (2, "b"), (3, "a")]
            .iter()
            .map(|(id, name)| {
                let mut data = Record::new();
                data.insert("name".to_string(), Value::from(*name));
                Row::new(*id, data)
            })
            .collect();

        let mut index = BTreeIndex::new("idx_name", "name", false);
        index.rebuild(&rows).unwrap();
        assert_eq!(index.find_exact(&Value::from("a")), vec![1, 3]);

        let mut unique = BTreeIndex::new("uq_name", "name", true);
        unique.insert(&Value::from("z"), 9).unwrap();
        assert!(unique.rebuild(&rows).is_err());
        assert_eq!(unique.find_exact(&Value::from("z")), vec![9]);
    }
}
