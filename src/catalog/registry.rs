//! Schema registry
//!
//! In-memory map of table name to schema, consulted by the executor to
//! validate every INSERT and UPDATE payload.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::schema::{Column, Schema};
use crate::error::{Error, Result};
use crate::storage::Record;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a new table schema
    pub fn define(&self, table_name: &str, columns: Vec<Column>) -> Result<Arc<Schema>> {
        let schema = Arc::new(Schema::new(table_name, columns)?);
        let mut schemas = self.schemas.write();
        if schemas.contains_key(table_name) {
            return Err(Error::TableAlreadyExists(table_name.to_string()));
        }
        schemas.insert(table_name.to_string(), schema.clone());
        Ok(schema)
    }

    /// Register a schema loaded from the catalog
    pub fn register(&self, table_name: &str, schema: Schema) {
        self.schemas
            .write()
            .insert(table_name.to_string(), Arc::new(schema));
    }

    /// Get a table's schema
    pub fn get(&self, table_name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(table_name).cloned()
    }

    /// Validate and coerce a row for `table_name`
    pub fn validate(&self, table_name: &str, values: &Record) -> Result<Record> {
        let schema = self
            .get(table_name)
            .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;
        schema.validate(table_name, values)
    }

    /// Forget a table's schema. Returns `false` if it was not defined.
    pub fn drop(&self, table_name: &str) -> bool {
        self.schemas.write().remove(table_name).is_some()
    }

    /// Names of all defined tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataType;
    use crate::storage::Value;

    #[test]
    fn test_define_get_drop() {
        let registry = SchemaRegistry::new();
        registry
            .define("items", vec![Column::new("sku", DataType::Text).primary_key(true)])
            .unwrap();

        assert!(registry.get("items").is_some());
        assert!(matches!(
            registry.define("items", vec![Column::new("x", DataType::Integer)]),
            Err(Error::TableAlreadyExists(_))
        ));

        assert!(registry.drop("items"));
        assert!(!registry.drop("items"));
        assert!(registry.get("items").is_none());
    }

    #[test]
    fn test_validate_unknown_table() {
        let registry = SchemaRegistry::new();
        let mut values = Record::new();
        values.insert("a".to_string(), Value::Integer(1));

        assert!(matches!(
            registry.validate("ghost", &values),
            Err(Error::TableNotFound(_))
        ));
    }
}
