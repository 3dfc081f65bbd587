//! Database handle
//!
//! [`Database`] is the public entry point: it owns the execution engine for
//! one data directory and turns SQL text into [`QueryResult`]s. Errors never
//! escape `execute`; they come back as failed results carrying an
//! [`ErrorKind`](crate::ErrorKind).
//!
//! A handle has one implicit session transaction driven by SQL `BEGIN`,
//! `COMMIT` and `ROLLBACK`. Explicit transactions are available through
//! [`Database::begin`] and [`Database::execute_in`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::catalog::CATALOG_VERSION;
use crate::catalog::{Column, IndexDef, Schema};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::executor::{ExecutionEngine, QueryResult};
use crate::sql::{self, Statement};
use crate::storage::file;
use crate::transaction::TxId;

/// Index details reported by [`Database::describe_table`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDescription {
    pub name: String,
    pub column: String,
    pub unique: bool,
    pub primary: bool,
    pub automatic: bool,
    pub distinct_keys: usize,
    pub total_entries: usize,
}

/// Table details reported by [`Database::describe_table`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexDescription>,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// CREATE TABLE statement that recreates the table
    pub ddl: String,
}

/// Database-wide summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub data_dir: PathBuf,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub table_count: usize,
    pub total_rows: usize,
    pub index_count: usize,
    pub active_transactions: usize,
}

/// Layout of a schema export file
#[derive(Debug, Serialize, Deserialize)]
struct SchemaExport {
    database: String,
    version: String,
    exported_at: DateTime<Utc>,
    tables: Vec<TableExport>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableExport {
    name: String,
    ddl: String,
    schema: Schema,
    indexes: Vec<IndexDef>,
}

/// A SimplDB database
pub struct Database {
    config: DatabaseConfig,
    engine: ExecutionEngine,
    /// Transaction opened by SQL `BEGIN` on this handle
    session: Mutex<Option<TxId>>,
    closed: Mutex<bool>,
}

impl Database {
    /// Open (or create) the database described by `config`
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let engine = ExecutionEngine::open(&config.data_dir, config.write_options())?;
        tracing::info!(
            name = %config.name,
            data_dir = %config.data_dir.display(),
            tables = engine.catalog().list_tables().len(),
            "database opened"
        );

        Ok(Self {
            config,
            engine,
            session: Mutex::new(None),
            closed: Mutex::new(false),
        })
    }

    /// Open a database in `data_dir` with default settings
    pub fn open_path(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(DatabaseConfig::new().data_dir(data_dir))
    }

    /// The configuration this database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Execute one SQL statement in the session
    pub fn execute(&self, sql: &str) -> QueryResult {
        into_result(self.try_execute(sql))
    }

    fn try_execute(&self, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        let stmt = sql::parse(sql)?;

        match stmt {
            Statement::Begin | Statement::Commit | Statement::Rollback => {
                let mut session = self.session.lock();
                self.engine.execute(stmt, &mut *session)
            }
            _ => {
                let mut session = {
                    let mut guard = self.session.lock();
                    // finished through begin/commit/rollback by id
                    if let Some(id) = *guard {
                        if !self.engine.transactions().is_active(id) {
                            *guard = None;
                        }
                    }
                    *guard
                };
                self.engine.execute(stmt, &mut session)
            }
        }
    }

    /// Execute statements in order, stopping after the first failure
    pub fn execute_many<S: AsRef<str>>(&self, statements: &[S]) -> Vec<QueryResult> {
        let mut results = Vec::with_capacity(statements.len());
        for sql in statements {
            let result = self.execute(sql.as_ref());
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }

    /// Split a script on statement terminators and execute each statement,
    /// stopping after the first failure
    pub fn execute_script(&self, script: &str) -> Vec<QueryResult> {
        self.execute_many(&sql::split_statements(script))
    }

    /// Execute one statement inside the transaction `tx_id`.
    ///
    /// `COMMIT` and `ROLLBACK` finish that transaction; `BEGIN` is rejected.
    pub fn execute_in(&self, tx_id: TxId, sql: &str) -> QueryResult {
        into_result(self.try_execute_in(tx_id, sql))
    }

    fn try_execute_in(&self, tx_id: TxId, sql: &str) -> Result<QueryResult> {
        self.ensure_open()?;
        if !self.engine.transactions().is_active(tx_id) {
            return Err(Error::TransactionNotActive(tx_id));
        }
        let stmt = sql::parse(sql)?;
        let mut session = Some(tx_id);
        self.engine.execute(stmt, &mut session)
    }

    /// Start an explicit transaction
    pub fn begin(&self) -> TxId {
        self.engine.transactions().begin()
    }

    /// Commit a transaction. Returns `false` for unknown or finished ids.
    pub fn commit(&self, tx_id: TxId) -> bool {
        self.engine.transactions().commit(tx_id)
    }

    /// Undo a transaction's changes. Returns `false` for unknown or
    /// finished ids.
    pub fn rollback(&self, tx_id: TxId) -> bool {
        self.engine.rollback(tx_id)
    }

    /// The session transaction, if one is open
    pub fn current_transaction(&self) -> Option<TxId> {
        let session = *self.session.lock();
        session.filter(|id| self.engine.transactions().is_active(*id))
    }

    /// Names of all tables, sorted
    pub fn list_tables(&self) -> Vec<String> {
        self.engine.catalog().list_tables()
    }

    /// Columns, indexes and statistics of a table
    pub fn describe_table(&self, name: &str) -> Option<TableDescription> {
        let entry = self.engine.catalog().get_table(name)?;
        let (row_count, stats) = match self.engine.table_stats(name) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(table = name, error = %e, "could not load table statistics");
                (entry.row_count, Vec::new())
            }
        };

        let indexes = entry
            .indexes
            .iter()
            .map(|def| {
                let stat = stats.iter().find(|(n, _)| *n == def.name).map(|(_, s)| *s);
                IndexDescription {
                    name: def.name.clone(),
                    column: def.column.clone(),
                    unique: def.unique,
                    primary: def.primary,
                    automatic: def.automatic,
                    distinct_keys: stat.map_or(0, |s| s.distinct_keys),
                    total_entries: stat.map_or(0, |s| s.total_entries),
                }
            })
            .collect();

        Some(TableDescription {
            ddl: entry.schema.to_ddl(&entry.name),
            name: entry.name,
            columns: entry.schema.columns().to_vec(),
            indexes,
            row_count,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
        })
    }

    /// Summary of the whole database
    pub fn database_info(&self) -> DatabaseInfo {
        let catalog = self.engine.catalog();
        let tables = catalog.tables();

        DatabaseInfo {
            name: self.config.name.clone(),
            data_dir: self.config.data_dir.clone(),
            version: catalog.version(),
            created_at: catalog.created_at(),
            table_count: tables.len(),
            total_rows: tables.iter().map(|t| t.row_count).sum(),
            index_count: tables.iter().map(|t| t.indexes.len()).sum(),
            active_transactions: self.engine.transactions().active().len(),
        }
    }

    /// Write every table's DDL, schema and index definitions to `path`
    pub fn export_schema(&self, path: impl AsRef<Path>) -> Result<()> {
        let tables = self
            .engine
            .catalog()
            .tables()
            .into_iter()
            .map(|entry| TableExport {
                ddl: entry.schema.to_ddl(&entry.name),
                name: entry.name,
                schema: entry.schema,
                indexes: entry.indexes,
            })
            .collect::<Vec<_>>();

        let export = SchemaExport {
            database: self.config.name.clone(),
            version: CATALOG_VERSION.to_string(),
            exported_at: Utc::now(),
            tables,
        };
        file::write_json(path.as_ref(), &export, self.config.write_options())?;
        tracing::info!(path = %path.as_ref().display(), tables = export.tables.len(), "schema exported");
        Ok(())
    }

    /// Recreate the tables and user indexes of a schema export.
    ///
    /// Returns one result per replayed statement; automatic indexes come
    /// back with their tables and are not replayed.
    pub fn import_schema(&self, path: impl AsRef<Path>) -> Result<Vec<QueryResult>> {
        let path = path.as_ref();
        let export: SchemaExport = file::read_json(path)?.ok_or_else(|| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("schema file {} not found", path.display()),
            ))
        })?;

        let mut results = Vec::new();
        for table in &export.tables {
            results.push(self.execute(&table.ddl));
        }
        for table in &export.tables {
            for index in table.indexes.iter().filter(|i| !i.automatic) {
                results.push(self.execute(&index.to_ddl()));
            }
        }

        tracing::info!(path = %path.display(), statements = results.len(), "schema imported");
        Ok(results)
    }

    /// Commit open transactions, flush the catalog and release tables.
    /// Later calls do nothing.
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock();
        if *closed {
            return Ok(());
        }
        *closed = true;
        self.session.lock().take();
        self.engine.close()?;
        tracing::info!(name = %self.config.name, "database closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.closed.lock() {
            return Err(Error::Internal("database is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "error while closing database");
        }
    }
}

fn into_result(result: Result<QueryResult>) -> QueryResult {
    match result {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(kind = %e.kind(), error = %e, "statement failed");
            QueryResult::from_error(&e)
        }
    }
}
