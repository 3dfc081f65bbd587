//! SimplDB - A small relational database engine written in Rust
//!
//! This library provides the components of a single-node SQL database:
//! - SQL parsing (lexer, parser, AST)
//! - Row storage in per-table JSON files
//! - Ordered secondary indexes
//! - System catalog and schema registry
//! - Query execution with rule-based index selection
//! - Undo-log transactions
//!
//! ```no_run
//! use simpldb::Database;
//!
//! let db = Database::open_path("data")?;
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)");
//! db.execute("INSERT INTO users VALUES (1, 'Alice')");
//! let result = db.execute("SELECT name FROM users WHERE id = 1");
//! assert_eq!(result.row_count(), 1);
//! # Ok::<(), simpldb::Error>(())
//! ```

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod index;
pub mod sql;
pub mod storage;
pub mod transaction;

pub use config::DatabaseConfig;
pub use database::{Database, DatabaseInfo, IndexDescription, TableDescription};
pub use error::{Error, ErrorKind, Result};
pub use executor::QueryResult;
pub use storage::{Record, RowId, Value};
pub use transaction::TxId;
