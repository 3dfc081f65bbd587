//! Schema definitions for SimplDB
//!
//! This module defines table schemas, column metadata and row validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::types::DataType;
use crate::error::{Error, Result};
use crate::storage::{Record, Value};

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Is this column nullable?
    pub nullable: bool,
    /// Value used when an INSERT omits the column
    pub default: Option<Value>,
    /// Is this the primary key?
    pub primary_key: bool,
    /// Is this column unique?
    pub unique: bool,
}

impl Column {
    /// Create a new nullable column without constraints
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set default value
    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set primary key flag; a primary key is never nullable
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        if pk {
            self.nullable = false;
        }
        self
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Render as a column definition inside CREATE TABLE
    pub fn to_ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.data_type);
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        }
        if self.unique && !self.primary_key {
            ddl.push_str(" UNIQUE");
        }
        if !self.nullable && !self.primary_key {
            ddl.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(&default.to_sql_literal());
        }
        ddl
    }

    fn coerce(&self, value: &Value) -> Result<Value> {
        let coerced = self
            .data_type
            .coerce(value)
            .ok_or_else(|| Error::TypeMismatch {
                column: self.name.clone(),
                value: value.to_sql_literal(),
                expected: self.data_type.to_string(),
            })?;

        if let (Some(max), Value::Text(s)) = (self.data_type.max_length(), &coerced) {
            if s.chars().count() > max {
                return Err(Error::ValueTooLarge {
                    column: self.name.clone(),
                    max,
                });
            }
        }
        Ok(coerced)
    }
}

/// Table schema - the ordered columns of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Column>", into = "Vec<Column>")]
pub struct Schema {
    /// Ordered list of columns
    columns: Vec<Column>,
    /// Column name to position mapping
    name_to_index: HashMap<String, usize>,
}

impl From<Vec<Column>> for Schema {
    fn from(columns: Vec<Column>) -> Self {
        let name_to_index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            columns,
            name_to_index,
        }
    }
}

impl From<Schema> for Vec<Column> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

impl Schema {
    /// Build a schema, rejecting definitions that cannot hold valid rows:
    /// no columns, duplicate names, zero-length VARCHAR, more than one
    /// primary key, or a default that does not fit its column.
    pub fn new(table_name: &str, columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "table '{}' must have at least one column",
                table_name
            )));
        }

        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(Error::DuplicateColumn(
                    col.name.clone(),
                    table_name.to_string(),
                ));
            }
            if col.data_type.max_length() == Some(0) {
                return Err(Error::InvalidSchema(format!(
                    "column '{}' must have a positive VARCHAR length",
                    col.name
                )));
            }
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::InvalidSchema(format!(
                "table '{}' declares more than one PRIMARY KEY",
                table_name
            )));
        }

        let mut columns = columns;
        for col in &mut columns {
            if col.primary_key {
                col.nullable = false;
            }
            if let Some(default) = col.default.take() {
                let coerced = col.coerce(&default)?;
                if coerced.is_null() && !col.nullable {
                    return Err(Error::NullNotAllowed(col.name.clone()));
                }
                col.default = Some(coerced);
            }
        }

        Ok(Schema::from(columns))
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Check if column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Get the primary key column, if any
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Validate and coerce a full row.
    ///
    /// Unknown columns are rejected, absent columns take their default (or
    /// NULL), NOT NULL is enforced, values are coerced to the column type and
    /// VARCHAR lengths are checked. Uniqueness is left to the indexes.
    pub fn validate(&self, table_name: &str, values: &Record) -> Result<Record> {
        for name in values.keys() {
            if !self.has_column(name) {
                return Err(Error::ColumnNotFound(name.clone(), table_name.to_string()));
            }
        }

        let mut row = Record::with_capacity(self.columns.len());
        for col in &self.columns {
            let raw = match values.get(&col.name) {
                Some(v) => v.clone(),
                None => col.default.clone().unwrap_or(Value::Null),
            };
            let value = col.coerce(&raw)?;
            if value.is_null() && !col.nullable {
                return Err(Error::NullNotAllowed(col.name.clone()));
            }
            row.insert(col.name.clone(), value);
        }
        Ok(row)
    }

    /// Validate assignments merged over an existing row
    pub fn validate_update(
        &self,
        table_name: &str,
        current: &Record,
        assignments: &Record,
    ) -> Result<Record> {
        for name in assignments.keys() {
            if !self.has_column(name) {
                return Err(Error::ColumnNotFound(name.clone(), table_name.to_string()));
            }
        }

        let mut merged = Record::with_capacity(self.columns.len());
        for col in &self.columns {
            let value = assignments
                .get(&col.name)
                .or_else(|| current.get(&col.name))
                .cloned()
                .unwrap_or(Value::Null);
            merged.insert(col.name.clone(), value);
        }
        self.validate(table_name, &merged)
    }

    /// Render as a CREATE TABLE statement
    pub fn to_ddl(&self, table_name: &str) -> String {
        let cols: Vec<String> = self.columns.iter().map(Column::to_ddl).collect();
        format!("CREATE TABLE {} ({})", table_name, cols.join(", "))
    }
}

/// Index descriptor kept in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name
    pub name: String,
    /// Table this index belongs to
    pub table_name: String,
    /// Indexed column
    pub column: String,
    /// Is this a unique index?
    pub unique: bool,
    /// Is this the primary key index?
    pub primary: bool,
    /// Created automatically with the table (PRIMARY KEY or UNIQUE column)
    #[serde(default)]
    pub automatic: bool,
    pub created_at: DateTime<Utc>,
}

impl IndexDef {
    /// Create a new non-unique index definition
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            column: column.into(),
            unique: false,
            primary: false,
            automatic: false,
            created_at: Utc::now(),
        }
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set primary flag; primary indexes are unique
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        if primary {
            self.unique = true;
        }
        self
    }

    /// Mark as created together with its table
    pub fn automatic(mut self, automatic: bool) -> Self {
        self.automatic = automatic;
        self
    }

    /// Name of the index backing a table's primary key
    pub fn primary_key_name(table_name: &str) -> String {
        format!("pk_{}", table_name)
    }

    /// Name of the index backing a UNIQUE column
    pub fn unique_column_name(table_name: &str, column: &str) -> String {
        format!("uq_{}_{}", table_name, column)
    }

    /// Render as a CREATE INDEX statement
    pub fn to_ddl(&self) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            self.table_name,
            self.column
        )
    }
}
