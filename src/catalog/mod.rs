//! Catalog module
//!
//! This module contains the system catalog, the schema registry, schema
//! definitions and data types.

pub mod catalog;
pub mod registry;
pub mod schema;
pub mod types;

pub use catalog::{check_index_name, check_table_name, Catalog, TableEntry};
pub use registry::SchemaRegistry;
pub use schema::{Column, IndexDef, Schema};
pub use types::DataType;
