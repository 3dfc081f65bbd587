//! Index manager for a single table
//!
//! Applies each row mutation to every index of the table. A row mutation is
//! all-or-nothing across indexes: when one index rejects it, the changes
//! already made to the other indexes are reverted before the error is
//! returned. The index set is written to `<table>_indexes.json` after every
//! successful mutation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::btree::{BTreeIndex, IndexStats};
use crate::catalog::IndexDef;
use crate::error::{Error, Result};
use crate::storage::file::{self, WriteOptions};
use crate::storage::{Record, Row, RowId, Value};

/// On-disk layout of an index file
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    table_name: String,
    indexes: Vec<BTreeIndex>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    table_name: &'a str,
    indexes: &'a [BTreeIndex],
}

/// Suffix appended to the table name to form its index file stem
pub const INDEX_FILE_SUFFIX: &str = "_indexes";

/// A change made to one index, kept so it can be reverted
enum Applied {
    Inserted { index: usize, key: Value },
    Deleted { index: usize, key: Value },
}

#[derive(Debug)]
pub struct IndexManager {
    table_name: String,
    path: PathBuf,
    indexes: Vec<BTreeIndex>,
    options: WriteOptions,
}

impl IndexManager {
    /// Path of the index file inside `data_dir`
    pub fn file_path(data_dir: &Path, table_name: &str) -> PathBuf {
        data_dir.join(format!("{}{}.json", table_name, INDEX_FILE_SUFFIX))
    }

    /// Create an empty index set
    pub fn new(data_dir: &Path, table_name: &str, options: WriteOptions) -> Self {
        Self {
            table_name: table_name.to_string(),
            path: Self::file_path(data_dir, table_name),
            indexes: Vec::new(),
            options,
        }
    }

    /// Load the indexes named by `defs`.
    ///
    /// Any index missing from the file, or every index when the file cannot
    /// be read, is rebuilt from `rows` and the file is rewritten.
    pub fn open(
        data_dir: &Path,
        table_name: &str,
        defs: &[IndexDef],
        rows: &[Row],
        options: WriteOptions,
    ) -> Result<Self> {
        let mut manager = Self::new(data_dir, table_name, options);

        let mut stored = match file::read_json::<IndexFile>(&manager.path) {
            Ok(Some(data)) => data.indexes,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(table = table_name, error = %e, "unreadable index file, rebuilding");
                Vec::new()
            }
        };

        let mut rebuilt = false;
        for def in defs {
            let index = match stored.iter().position(|i| i.name == def.name) {
                Some(pos) => stored.swap_remove(pos),
                None => {
                    tracing::warn!(table = table_name, index = %def.name, "index missing on disk, rebuilding");
                    let mut index = BTreeIndex::from_def(def);
                    index.rebuild(rows)?;
                    rebuilt = true;
                    index
                }
            };
            manager.indexes.push(index);
        }

        if rebuilt || !stored.is_empty() {
            manager.persist()?;
        }
        Ok(manager)
    }

    /// Build a new index over `rows` and add it to the set
    pub fn add_index(&mut self, def: &IndexDef, rows: &[Row]) -> Result<()> {
        if self.get(&def.name).is_some() {
            return Err(Error::IndexAlreadyExists(def.name.clone()));
        }
        let mut index = BTreeIndex::from_def(def);
        index.rebuild(rows)?;
        self.indexes.push(index);

        if let Err(e) = self.persist() {
            self.indexes.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove an index from the set
    pub fn remove_index(&mut self, name: &str) -> Result<()> {
        let pos = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))?;
        let index = self.indexes.remove(pos);

        if let Err(e) = self.persist() {
            self.indexes.insert(pos, index);
            return Err(e);
        }
        Ok(())
    }

    /// Get an index by name
    pub fn get(&self, name: &str) -> Option<&BTreeIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Get an index on `column`, preferring a unique one
    pub fn index_for_column(&self, column: &str) -> Option<&BTreeIndex> {
        let mut candidates = self.indexes.iter().filter(|i| i.column_name == column);
        let first = candidates.next()?;
        if first.unique {
            return Some(first);
        }
        candidates.find(|i| i.unique).or(Some(first))
    }

    /// All indexes of the table
    pub fn indexes(&self) -> &[BTreeIndex] {
        &self.indexes
    }

    /// Index a newly stored row
    pub fn insert_row(&mut self, row_id: RowId, values: &Record) -> Result<()> {
        let mut applied = Vec::new();
        for i in 0..self.indexes.len() {
            let key = lookup(values, &self.indexes[i].column_name);
            if let Err(e) = self.indexes[i].insert(&key, row_id) {
                self.revert(row_id, applied);
                return Err(e);
            }
            if !key.is_null() {
                applied.push(Applied::Inserted { index: i, key });
            }
        }
        self.commit(row_id, applied)
    }

    /// Drop a removed row from every index
    pub fn delete_row(&mut self, row_id: RowId, values: &Record) -> Result<()> {
        let mut applied = Vec::new();
        for i in 0..self.indexes.len() {
            let key = lookup(values, &self.indexes[i].column_name);
            if self.indexes[i].delete(&key, row_id) {
                applied.push(Applied::Deleted { index: i, key });
            }
        }
        self.commit(row_id, applied)
    }

    /// Move a row's keys from `old` to `new`; unchanged columns are untouched
    pub fn update_row(&mut self, row_id: RowId, old: &Record, new: &Record) -> Result<()> {
        let mut applied = Vec::new();
        for i in 0..self.indexes.len() {
            let column = &self.indexes[i].column_name;
            let old_key = lookup(old, column);
            let new_key = lookup(new, column);
            if old_key == new_key {
                continue;
            }

            if self.indexes[i].delete(&old_key, row_id) {
                applied.push(Applied::Deleted {
                    index: i,
                    key: old_key,
                });
            }
            if let Err(e) = self.indexes[i].insert(&new_key, row_id) {
                self.revert(row_id, applied);
                return Err(e);
            }
            if !new_key.is_null() {
                applied.push(Applied::Inserted {
                    index: i,
                    key: new_key,
                });
            }
        }
        self.commit(row_id, applied)
    }

    /// Per-index size figures, in index order
    pub fn stats(&self) -> Vec<(String, IndexStats)> {
        self.indexes
            .iter()
            .map(|i| (i.name.clone(), i.stats()))
            .collect()
    }

    /// Delete the index file
    pub fn drop_file(&self) -> Result<()> {
        file::remove_if_exists(&self.path)
    }

    fn commit(&mut self, row_id: RowId, applied: Vec<Applied>) -> Result<()> {
        if applied.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.persist() {
            self.revert(row_id, applied);
            return Err(e);
        }
        Ok(())
    }

    fn revert(&mut self, row_id: RowId, applied: Vec<Applied>) {
        for op in applied.into_iter().rev() {
            match op {
                Applied::Inserted { index, key } => {
                    self.indexes[index].delete(&key, row_id);
                }
                Applied::Deleted { index, key } => {
                    // the key was present a moment ago, so this cannot collide
                    let _ = self.indexes[index].insert(&key, row_id);
                }
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let data = IndexFileRef {
            table_name: &self.table_name,
            indexes: &self.indexes,
        };
        file::write_json(&self.path, &data, self.options)
    }
}

fn lookup(values: &Record, column: &str) -> Value {
    values.get(column).cloned().unwrap_or(Value::Null)
}
