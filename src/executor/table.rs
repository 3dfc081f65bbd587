//! Loaded tables
//!
//! A [`TableData`] pairs a table's row store with its index set under one
//! lock. Each method here is a single logical row operation: the row store
//! is written first, then every index; if an index rejects the change the
//! row store write is undone before the error is returned.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::TableEntry;
use crate::error::{Error, Result};
use crate::index::IndexManager;
use crate::storage::{Record, Row, RowId, RowStore, WriteOptions};

/// Shared handle to a loaded table
pub type TableHandle = Arc<Mutex<TableData>>;

#[derive(Debug)]
pub struct TableData {
    pub store: RowStore,
    pub indexes: IndexManager,
    /// Set by DROP TABLE; holders of an old handle must not write through it
    dropped: bool,
}

impl TableData {
    /// Create the files for a new, empty table
    pub fn create(data_dir: &Path, entry: &TableEntry, options: WriteOptions) -> Result<Self> {
        let store = RowStore::init(data_dir, &entry.name, options)?;
        let mut indexes = IndexManager::new(data_dir, &entry.name, options);
        for def in &entry.indexes {
            if let Err(e) = indexes.add_index(def, &[]) {
                let _ = store.drop_file();
                return Err(e);
            }
        }
        Ok(Self {
            store,
            indexes,
            dropped: false,
        })
    }

    /// Load an existing table, rebuilding indexes that are missing on disk
    pub fn load(data_dir: &Path, entry: &TableEntry, options: WriteOptions) -> Result<Self> {
        let store = RowStore::open(data_dir, &entry.name, options)?;
        let rows = store.scan();
        let indexes = IndexManager::open(data_dir, &entry.name, &entry.indexes, &rows, options)?;
        Ok(Self {
            store,
            indexes,
            dropped: false,
        })
    }

    pub fn into_handle(self) -> TableHandle {
        Arc::new(Mutex::new(self))
    }

    /// Fail if this table has been dropped since the handle was taken
    pub fn ensure_live(&self) -> Result<()> {
        if self.dropped {
            return Err(Error::TableNotFound(self.store.table_name().to_string()));
        }
        Ok(())
    }

    /// Delete the table and index files and mark the handle dead
    pub fn drop_files(&mut self) -> Result<()> {
        self.dropped = true;
        self.store.drop_file()?;
        self.indexes.drop_file()
    }

    /// Insert an already validated row
    pub fn insert(&mut self, values: Record) -> Result<RowId> {
        let row_id = self.store.create(values.clone())?;
        if let Err(e) = self.indexes.insert_row(row_id, &values) {
            let undone = self.store.delete(row_id).map(|_| ());
            self.undo_step(undone);
            return Err(e);
        }
        Ok(row_id)
    }

    /// Replace a row's values with a fully validated record.
    /// Returns the prior values, or `None` if the row does not exist.
    pub fn update(&mut self, row_id: RowId, values: Record) -> Result<Option<Record>> {
        let Some(prior) = self.store.read(row_id) else {
            return Ok(None);
        };
        self.store.update(row_id, values.clone())?;
        if let Err(e) = self.indexes.update_row(row_id, &prior.data, &values) {
            let undone = self.store.restore(prior);
            self.undo_step(undone);
            return Err(e);
        }
        Ok(Some(prior.data))
    }

    /// Remove a row. Returns the removed row, or `None` if it does not exist.
    pub fn remove(&mut self, row_id: RowId) -> Result<Option<Row>> {
        let Some(row) = self.store.delete(row_id)? else {
            return Ok(None);
        };
        if let Err(e) = self.indexes.delete_row(row_id, &row.data) {
            let undone = self.store.restore(row);
            self.undo_step(undone);
            return Err(e);
        }
        Ok(Some(row))
    }

    /// Put back a removed row with its original id and timestamps
    pub fn reinsert(&mut self, row: Row) -> Result<()> {
        let row_id = row.row_id;
        let values = row.data.clone();
        self.store.restore(row)?;
        if let Err(e) = self.indexes.insert_row(row_id, &values) {
            let undone = self.store.delete(row_id).map(|_| ());
            self.undo_step(undone);
            return Err(e);
        }
        Ok(())
    }

    /// Read rows by id, skipping ids that no longer exist
    pub fn read_many(&self, ids: &[RowId]) -> Vec<Row> {
        ids.iter().filter_map(|id| self.store.read(*id)).collect()
    }

    fn undo_step(&self, result: Result<()>) {
        if let Err(e) = result {
            tracing::warn!(table = self.store.table_name(), error = %e, "compensation write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, IndexDef, Schema};
    use crate::storage::Value;
    use tempfile::TempDir;

    fn entry() -> TableEntry {
        let schema = Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Integer).primary_key(true),
                Column::new("email", DataType::Text).unique(true),
            ],
        )
        .unwrap();
        TableEntry::new(
            "users",
            schema,
            vec![
                IndexDef::new("pk_users", "users", "id").primary(true),
                IndexDef::new("uq_users_email", "users", "email").unique(true),
            ],
        )
    }

    fn record(id: i64, email: &str) -> Record {
        let mut r = Record::new();
        r.insert("id".to_string(), Value::Integer(id));
        r.insert("email".to_string(), Value::from(email));
        r
    }

    #[test]
    fn test_failed_insert_leaves_no_row() {
        let dir = TempDir::new().unwrap();
        let mut table = TableData::create(dir.path(), &entry(), WriteOptions::default()).unwrap();

        table.insert(record(1, "a@x")).unwrap();
        let err = table.insert(record(1, "b@x")).unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { .. }));

        assert_eq!(table.store.count(), 1);
        // the failed insert consumed id 2
        assert_eq!(table.store.next_id(), 3);
        let email = table.indexes.get("uq_users_email").unwrap();
        assert!(email.find_exact(&Value::from("b@x")).is_empty());
    }

    #[test]
    fn test_failed_update_restores_row() {
        let dir = TempDir::new().unwrap();
        let mut table = TableData::create(dir.path(), &entry(), WriteOptions::default()).unwrap();
        table.insert(record(1, "a@x")).unwrap();
        let id = table.insert(record(2, "b@x")).unwrap();

        assert!(table.update(id, record(2, "a@x")).is_err());
        assert_eq!(table.store.read(id).unwrap().data, record(2, "b@x"));

        let prior = table.update(id, record(2, "c@x")).unwrap().unwrap();
        assert_eq!(prior, record(2, "b@x"));
        assert!(table.update(99, record(9, "z@x")).unwrap().is_none());
    }

    #[test]
    fn test_remove_and_reinsert() {
        let dir = TempDir::new().unwrap();
        let mut table = TableData::create(dir.path(), &entry(), WriteOptions::default()).unwrap();
        let id = table.insert(record(1, "a@x")).unwrap();

        let row = table.remove(id).unwrap().unwrap();
        assert!(table.indexes.get("pk_users").unwrap().entries().is_empty());

        table.reinsert(row).unwrap();
        assert_eq!(table.store.read(id).unwrap().data, record(1, "a@x"));
        assert_eq!(
            table.indexes.get("pk_users").unwrap().find_exact(&Value::Integer(1)),
            vec![id]
        );
    }

    #[test]
    fn test_dropped_table_is_not_live() {
        let dir = TempDir::new().unwrap();
        let mut table = TableData::create(dir.path(), &entry(), WriteOptions::default()).unwrap();
        table.drop_files().unwrap();

        assert!(matches!(table.ensure_live(), Err(Error::TableNotFound(_))));
        assert!(!RowStore::file_path(dir.path(), "users").exists());
    }
}
