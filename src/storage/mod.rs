//! Storage module
//!
//! This module contains the row storage components:
//! - Column values
//! - Rows and row identifiers
//! - Per-table row store
//! - Atomic JSON file writes

pub mod file;
pub mod row;
pub mod row_store;
pub mod value;

pub use file::WriteOptions;
pub use row::{Record, Row, RowId};
pub use row_store::RowStore;
pub use value::Value;
