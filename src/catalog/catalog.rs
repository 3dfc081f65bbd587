//! System Catalog for SimplDB
//!
//! This module manages metadata about tables and indexes: schemas, index
//! descriptors, row counts and timestamps. The whole catalog is written to
//! `<data_dir>/catalog.json` after every change.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::schema::{IndexDef, Schema};
use crate::error::{Error, Result};
use crate::index::manager::INDEX_FILE_SUFFIX;
use crate::storage::file::{self, WriteOptions};

/// Catalog format version
pub const CATALOG_VERSION: &str = "0.1.0";

/// Catalog file name inside the data directory
pub const CATALOG_FILE: &str = "catalog.json";

/// Check that `name` is usable as a table name.
///
/// Table names become file names inside the data directory, so they are
/// limited to ASCII letters, digits and `_`, and may not map onto the
/// catalog file or onto another table's index file.
pub fn check_table_name(name: &str) -> Result<()> {
    check_identifier("table", name)?;
    let lower = name.to_ascii_lowercase();
    if format!("{}.json", lower) == CATALOG_FILE {
        return Err(Error::InvalidSchema(format!(
            "table name '{}' is reserved",
            name
        )));
    }
    if lower.ends_with(INDEX_FILE_SUFFIX) {
        return Err(Error::InvalidSchema(format!(
            "table name '{}' may not end with '{}'",
            name, INDEX_FILE_SUFFIX
        )));
    }
    Ok(())
}

/// Check that `name` is usable as an index name
pub fn check_index_name(name: &str) -> Result<()> {
    check_identifier("index", name)
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSchema(format!("{} name cannot be empty", kind)));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidSchema(format!(
            "invalid {} name '{}': only letters, digits and '_' are allowed",
            kind, name
        )));
    }
    Ok(())
}

/// Metadata for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub schema: Schema,
    pub indexes: Vec<IndexDef>,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl TableEntry {
    /// Create an entry for a new, empty table
    pub fn new(name: impl Into<String>, schema: Schema, indexes: Vec<IndexDef>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            schema,
            indexes,
            row_count: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Get index descriptor by name
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Serializable proxy for Catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogData {
    version: String,
    created_at: DateTime<Utc>,
    tables: BTreeMap<String, TableEntry>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl CatalogData {
    fn new() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            created_at: Utc::now(),
            tables: BTreeMap::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// System Catalog - manages all database metadata
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    options: WriteOptions,
    data: Mutex<CatalogData>,
}

impl Catalog {
    /// Load the catalog from `data_dir`, creating an empty one if absent
    pub fn open(data_dir: &Path, options: WriteOptions) -> Result<Self> {
        let path = data_dir.join(CATALOG_FILE);
        let data = match file::read_json::<CatalogData>(&path)? {
            Some(data) => {
                tracing::info!(tables = data.tables.len(), "loaded catalog");
                data
            }
            None => {
                let data = CatalogData::new();
                file::write_json(&path, &data, options)?;
                tracing::info!(path = %path.display(), "created new catalog");
                data
            }
        };

        Ok(Self {
            path,
            options,
            data: Mutex::new(data),
        })
    }

    /// When the catalog was first created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.data.lock().created_at
    }

    /// Catalog format version
    pub fn version(&self) -> String {
        self.data.lock().version.clone()
    }

    /// Register a new table
    pub fn create_table(&self, entry: TableEntry) -> Result<()> {
        self.mutate(|data| {
            if data.tables.contains_key(&entry.name) {
                return Err(Error::TableAlreadyExists(entry.name.clone()));
            }
            for index in &entry.indexes {
                if data
                    .tables
                    .values()
                    .any(|t| t.indexes.iter().any(|i| i.name == index.name))
                {
                    return Err(Error::IndexAlreadyExists(index.name.clone()));
                }
            }
            data.tables.insert(entry.name.clone(), entry);
            Ok(())
        })
    }

    /// Remove a table and its index descriptors
    pub fn drop_table(&self, name: &str) -> Result<TableEntry> {
        self.mutate(|data| {
            data.tables
                .remove(name)
                .ok_or_else(|| Error::TableNotFound(name.to_string()))
        })
    }

    /// Get a copy of a table's metadata
    pub fn get_table(&self, name: &str) -> Option<TableEntry> {
        self.data.lock().tables.get(name).cloned()
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.data.lock().tables.contains_key(name)
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        self.data.lock().tables.keys().cloned().collect()
    }

    /// All table entries, sorted by name
    pub fn tables(&self) -> Vec<TableEntry> {
        self.data.lock().tables.values().cloned().collect()
    }

    /// Add an index descriptor. Index names are unique across the database.
    pub fn add_index(&self, index: IndexDef) -> Result<()> {
        self.mutate(|data| {
            if data
                .tables
                .values()
                .any(|t| t.indexes.iter().any(|i| i.name == index.name))
            {
                return Err(Error::IndexAlreadyExists(index.name.clone()));
            }
            let table = data
                .tables
                .get_mut(&index.table_name)
                .ok_or_else(|| Error::TableNotFound(index.table_name.clone()))?;
            table.indexes.push(index);
            table.modified_at = Utc::now();
            Ok(())
        })
    }

    /// Remove an index descriptor
    pub fn remove_index(&self, table_name: &str, index_name: &str) -> Result<IndexDef> {
        self.mutate(|data| {
            let table = data
                .tables
                .get_mut(table_name)
                .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
            let pos = table
                .indexes
                .iter()
                .position(|i| i.name == index_name)
                .ok_or_else(|| Error::IndexNotFound(index_name.to_string()))?;
            table.modified_at = Utc::now();
            Ok(table.indexes.remove(pos))
        })
    }

    /// Look up an index by name in any table
    pub fn find_index(&self, index_name: &str) -> Option<IndexDef> {
        self.data
            .lock()
            .tables
            .values()
            .flat_map(|t| t.indexes.iter())
            .find(|i| i.name == index_name)
            .cloned()
    }

    /// Record a data change: new row count and modification time
    pub fn record_write(&self, table_name: &str, row_count: usize) -> Result<()> {
        self.mutate(|data| {
            let table = data
                .tables
                .get_mut(table_name)
                .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
            table.row_count = row_count;
            table.modified_at = Utc::now();
            Ok(())
        })
    }

    /// Read a database-level metadata entry
    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().metadata.get(key).cloned()
    }

    /// Set a database-level metadata entry
    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let key = key.into();
        self.mutate(|data| {
            data.metadata.insert(key, value);
            Ok(())
        })
    }

    /// Write the catalog to disk
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock();
        file::write_json(&self.path, &*data, self.options)
    }

    /// Apply `f` to a scratch copy, persist it, then publish it.
    /// Nothing changes in memory if `f` or the write fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut CatalogData) -> Result<T>) -> Result<T> {
        let mut guard = self.data.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        file::write_json(&self.path, &next, self.options)?;
        *guard = next;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType};
    use tempfile::TempDir;

    fn users_entry() -> TableEntry {
        let schema = Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Integer).primary_key(true),
                Column::new("email", DataType::Varchar(255)),
            ],
        )
        .unwrap();
        let pk = IndexDef::new("pk_users", "users", "id").primary(true);
        TableEntry::new("users", schema, vec![pk])
    }

    #[test]
    fn test_create_and_get_table() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), WriteOptions::default()).unwrap();

        catalog.create_table(users_entry()).unwrap();

        let entry = catalog.get_table("users").unwrap();
        assert_eq!(entry.schema.columns().len(), 2);
        assert_eq!(entry.row_count, 0);
        assert!(matches!(
            catalog.create_table(users_entry()),
            Err(Error::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_indexes() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), WriteOptions::default()).unwrap();
        catalog.create_table(users_entry()).unwrap();

        catalog
            .add_index(IndexDef::new("idx_email", "users", "email").unique(true))
            .unwrap();
        assert!(matches!(
            catalog.add_index(IndexDef::new("idx_email", "users", "email")),
            Err(Error::IndexAlreadyExists(_))
        ));
        assert_eq!(catalog.find_index("idx_email").unwrap().table_name, "users");

        catalog.remove_index("users", "idx_email").unwrap();
        assert!(catalog.find_index("idx_email").is_none());
        assert!(matches!(
            catalog.remove_index("users", "idx_email"),
            Err(Error::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_persisted_across_open() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = Catalog::open(dir.path(), WriteOptions::default()).unwrap();
            catalog.create_table(users_entry()).unwrap();
            catalog.record_write("users", 3).unwrap();
            catalog
                .set_metadata("owner", serde_json::json!("ops"))
                .unwrap();
        }

        let catalog = Catalog::open(dir.path(), WriteOptions::default()).unwrap();
        assert_eq!(catalog.list_tables(), vec!["users".to_string()]);
        assert_eq!(catalog.get_table("users").unwrap().row_count, 3);
        assert_eq!(catalog.metadata("owner"), Some(serde_json::json!("ops")));
        assert_eq!(catalog.version(), CATALOG_VERSION);
    }

    #[test]
    fn test_drop_table() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::open(dir.path(), WriteOptions::default()).unwrap();
        catalog.create_table(users_entry()).unwrap();

        let dropped = catalog.drop_table("users").unwrap();
        assert_eq!(dropped.indexes.len(), 1);
        assert!(!catalog.table_exists("users"));
        assert!(matches!(catalog.drop_table("users"), Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_table_name_rules() {
        for name in ["users", "order_items", "T2", "_tmp"] {
            assert!(check_table_name(name).is_ok(), "{}", name);
        }
        for name in [
            "", "catalog", "Catalog", "users_indexes", "a_INDEXES", "../escaped", "a/b", "a\\b",
            ".", "..", "two words", "dot.json",
        ] {
            assert!(
                matches!(check_table_name(name), Err(Error::InvalidSchema(_))),
                "{:?}",
                name
            );
        }

        assert!(check_index_name("idx_catalog").is_ok());
        assert!(check_index_name("users_indexes").is_ok());
        assert!(matches!(check_index_name("../idx"), Err(Error::InvalidSchema(_))));
    }
}
