//! Row store for a single table
//!
//! The whole table lives in memory once opened. Every mutation rewrites
//! `<data_dir>/<table>.json` before returning; if that write fails the
//! in-memory state is put back the way it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::file::{self, WriteOptions};
use super::row::{Record, Row, RowId};
use crate::error::Result;

/// On-disk layout of a table file
#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    rows: Vec<Row>,
    next_id: RowId,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Rows of one table, keyed by row id
#[derive(Debug)]
pub struct RowStore {
    table_name: String,
    path: PathBuf,
    rows: BTreeMap<RowId, Row>,
    next_id: RowId,
    metadata: serde_json::Map<String, serde_json::Value>,
    options: WriteOptions,
}

impl RowStore {
    /// Path of the table file inside `data_dir`
    pub fn file_path(data_dir: &Path, table_name: &str) -> PathBuf {
        data_dir.join(format!("{}.json", table_name))
    }

    /// Create an empty table and write its file
    pub fn init(data_dir: &Path, table_name: &str, options: WriteOptions) -> Result<Self> {
        let store = Self {
            table_name: table_name.to_string(),
            path: Self::file_path(data_dir, table_name),
            rows: BTreeMap::new(),
            next_id: 1,
            metadata: serde_json::Map::new(),
            options,
        };
        store.persist()?;
        Ok(store)
    }

    /// Load a table from its file; a missing file yields an empty table
    pub fn open(data_dir: &Path, table_name: &str, options: WriteOptions) -> Result<Self> {
        let path = Self::file_path(data_dir, table_name);
        let data: TableFile = file::read_json(&path)?.unwrap_or_default();

        let rows: BTreeMap<RowId, Row> = data.rows.into_iter().map(|r| (r.row_id, r)).collect();
        let max_id = rows.keys().next_back().copied().unwrap_or(0);

        tracing::debug!(table = table_name, rows = rows.len(), "loaded table file");

        Ok(Self {
            table_name: table_name.to_string(),
            path,
            rows,
            next_id: data.next_id.max(max_id + 1).max(1),
            metadata: data.metadata,
            options,
        })
    }

    /// Get the table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Insert a row and return its new id
    pub fn create(&mut self, values: Record) -> Result<RowId> {
        let row_id = self.next_id;
        self.next_id += 1;
        self.rows.insert(row_id, Row::new(row_id, values));

        if let Err(e) = self.persist() {
            self.rows.remove(&row_id);
            self.next_id -= 1;
            return Err(e);
        }
        Ok(row_id)
    }

    /// Get a copy of a row
    pub fn read(&self, row_id: RowId) -> Option<Row> {
        self.rows.get(&row_id).cloned()
    }

    /// All rows in id order
    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    /// Assign `values` over the stored row. Returns `false` for an unknown id.
    pub fn update(&mut self, row_id: RowId, values: Record) -> Result<bool> {
        let Some(row) = self.rows.get_mut(&row_id) else {
            return Ok(false);
        };
        let prior = row.clone();
        for (column, value) in values {
            row.data.insert(column, value);
        }
        row.updated_at = chrono::Utc::now();

        if let Err(e) = self.persist() {
            self.rows.insert(row_id, prior);
            return Err(e);
        }
        Ok(true)
    }

    /// Remove a row. Returns the removed row, `None` for an unknown id.
    pub fn delete(&mut self, row_id: RowId) -> Result<Option<Row>> {
        let Some(row) = self.rows.remove(&row_id) else {
            return Ok(None);
        };

        if let Err(e) = self.persist() {
            self.rows.insert(row_id, row);
            return Err(e);
        }
        Ok(Some(row))
    }

    /// Put a row back with its original id and timestamps
    pub fn restore(&mut self, row: Row) -> Result<()> {
        let row_id = row.row_id;
        let prior = self.rows.insert(row_id, row);
        let prior_next = self.next_id;
        self.next_id = self.next_id.max(row_id + 1);

        if let Err(e) = self.persist() {
            match prior {
                Some(p) => self.rows.insert(row_id, p),
                None => self.rows.remove(&row_id),
            };
            self.next_id = prior_next;
            return Err(e);
        }
        Ok(())
    }

    /// Number of rows
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// The id the next insert will receive
    pub fn next_id(&self) -> RowId {
        self.next_id
    }

    /// Read a metadata entry
    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Set a metadata entry and persist it
    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let key = key.into();
        let prior = self.metadata.insert(key.clone(), value);
        if let Err(e) = self.persist() {
            match prior {
                Some(p) => self.metadata.insert(key, p),
                None => self.metadata.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Delete the table file
    pub fn drop_file(&self) -> Result<()> {
        file::remove_if_exists(&self.path)
    }

    fn persist(&self) -> Result<()> {
        let data = TableFileRef {
            rows: self.rows.values().collect(),
            next_id: self.next_id,
            metadata: &self.metadata,
        };
        file::write_json(&self.path, &data, self.options)
    }
}

/// Borrowing twin of [`TableFile`] so persisting does not clone every row
#[derive(Serialize)]
struct TableFileRef<'a> {
    rows: Vec<&'a Row>,
    next_id: RowId,
    metadata: &'a serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;
    use tempfile::TempDir;

    fn record(id: i64, name: &str) -> Record {
        let mut r = Record::new();
        r.insert("id".to_string(), Value::Integer(id));
        r.insert("name".to_string(), Value::from(name));
        r
    }

    #[test]
    fn test_create_read_scan() {
        let dir = TempDir::new().unwrap();
        let mut store = RowStore::init(dir.path(), "users", WriteOptions::default()).unwrap();

        let a = store.create(record(1, "Ann")).unwrap();
        let b = store.create(record(2, "Bob")).unwrap();
        assert_eq!((a, b), (1, 2));

        assert_eq!(store.read(a).unwrap().get("name"), &Value::from("Ann"));
        assert!(store.read(99).is_none());
        let ids: Vec<RowId> = store.scan().iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_ids_never_reused() {
        let dir = TempDir::new().unwrap();
        let mut store = RowStore::init(dir.path(), "t", WriteOptions::default()).unwrap();

        let a = store.create(record(1, "a")).unwrap();
        store.delete(a).unwrap();
        let b = store.create(record(2, "b")).unwrap();
        assert!(b > a);

        let reopened = RowStore::open(dir.path(), "t", WriteOptions::default()).unwrap();
        assert_eq!(reopened.next_id(), b + 1);
    }

    #[test]
    fn test_update_and_delete_unknown_row() {
        let dir = TempDir::new().unwrap();
        let mut store = RowStore::init(dir.path(), "t", WriteOptions::default()).unwrap();

        assert!(!store.update(7, record(1, "x")).unwrap());
        assert!(store.delete(7).unwrap().is_none());
    }

    #[test]
    fn test_update_merges_values() {
        let dir = TempDir::new().unwrap();
        let mut store = RowStore::init(dir.path(), "t", WriteOptions::default()).unwrap();
        let id = store.create(record(1, "old")).unwrap();

        let mut change = Record::new();
        change.insert("name".to_string(), Value::from("new"));
        assert!(store.update(id, change).unwrap());

        let row = store.read(id).unwrap();
        assert_eq!(row.get("id"), &Value::Integer(1));
        assert_eq!(row.get("name"), &Value::from("new"));
        assert!(row.updated_at >= row.created_at);
    }

    #[test]
    fn test_restore_keeps_original_id() {
        let dir = TempDir::new().unwrap();
        let mut store = RowStore::init(dir.path(), "t", WriteOptions::default()).unwrap();
        let id = store.create(record(1, "a")).unwrap();
        let removed = store.delete(id).unwrap().unwrap();

        store.restore(removed.clone()).unwrap();
        assert_eq!(store.read(id), Some(removed));
        assert_eq!(store.next_id(), id + 1);
    }

    #[test]
    fn test_persisted_across_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RowStore::init(dir.path(), "t", WriteOptions::default()).unwrap();
            store.create(record(1, "a")).unwrap();
            store
                .set_metadata("description", serde_json::json!("people"))
                .unwrap();
        }

        let store = RowStore::open(dir.path(), "t", WriteOptions::default()).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.metadata("description"), Some(&serde_json::json!("people")));
    }
}
