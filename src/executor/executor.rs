//! Query Executor for SimplDB
//!
//! This module executes parsed statements and returns results.
//!
//! Every statement is all-or-nothing. Row writes go through
//! [`TableData`], which undoes its own row store write when an index
//! rejects a change; statements touching several rows additionally undo the
//! rows they already changed before surfacing the error. Inside a
//! transaction the undo records of a successful statement are appended to
//! the transaction log.

use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::filter::{bind_conditions, Scope, ScopeColumn};
use super::planner::ScanPlan;
use super::table::{TableData, TableHandle};
use crate::catalog::{
    check_index_name, check_table_name, Catalog, Column, IndexDef, Schema, SchemaRegistry,
    TableEntry,
};
use crate::error::{Error, ErrorKind, Result};
use crate::index::{IndexManager, IndexStats};
use crate::sql::ast::*;
use crate::storage::file;
use crate::storage::{Record, Row, RowId, RowStore, Value, WriteOptions};
use crate::transaction::{TransactionManager, TxId, UndoOp};

/// Query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Whether the statement succeeded
    pub success: bool,
    /// Human-readable outcome or error description
    pub message: String,
    /// Column names, in output order
    pub columns: Vec<String>,
    /// Result rows (for SELECT)
    pub rows: Vec<Record>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    pub rows_affected: usize,
    /// Classification of the failure, if any
    pub error_kind: Option<ErrorKind>,
    /// Id assigned to the last row inserted by the statement
    pub last_row_id: Option<RowId>,
}

impl QueryResult {
    /// Create a result with a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
            error_kind: None,
            last_row_id: None,
        }
    }

    /// Create a result with affected rows count
    pub fn with_affected_rows(count: usize, message: impl Into<String>) -> Self {
        Self {
            rows_affected: count,
            ..Self::with_message(message)
        }
    }

    /// Create a result carrying rows
    pub fn with_rows(columns: Vec<String>, rows: Vec<Record>) -> Self {
        let message = format!("{} row(s) returned", rows.len());
        Self {
            columns,
            rows,
            ..Self::with_message(message)
        }
    }

    /// Create a failed result from an error
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            error_kind: Some(error.kind()),
            ..Self::with_message(error.to_string())
        }
    }

    /// Number of result rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Execution Engine
pub struct ExecutionEngine {
    data_dir: PathBuf,
    options: WriteOptions,
    /// System catalog
    catalog: Catalog,
    /// Validated schemas by table name
    registry: SchemaRegistry,
    /// Loaded tables; taken for writing by structural changes
    tables: RwLock<HashMap<String, TableHandle>>,
    /// Transaction Manager
    transactions: TransactionManager,
}

impl ExecutionEngine {
    /// Open the engine over `data_dir`, creating the directory if needed.
    /// Tables are loaded lazily on first use.
    pub fn open(data_dir: &Path, options: WriteOptions) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let catalog = Catalog::open(data_dir, options)?;

        let registry = SchemaRegistry::new();
        for entry in catalog.tables() {
            registry.register(&entry.name, entry.schema);
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            options,
            catalog,
            registry,
            tables: RwLock::new(HashMap::new()),
            transactions: TransactionManager::new(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Execute a statement. `session` is the transaction the caller is in;
    /// BEGIN, COMMIT and ROLLBACK update it.
    pub fn execute(&self, stmt: Statement, session: &mut Option<TxId>) -> Result<QueryResult> {
        tracing::debug!(statement = stmt.name(), tx = ?session, "executing");

        match stmt {
            Statement::CreateTable(s) => self.execute_create_table(s),
            Statement::DropTable(s) => self.execute_drop_table(s),
            Statement::CreateIndex(s) => self.execute_create_index(s),
            Statement::DropIndex(s) => self.execute_drop_index(s),
            Statement::Insert(s) => self.execute_insert(s, *session),
            Statement::Select(s) => self.execute_select(s),
            Statement::Update(s) => self.execute_update(s, *session),
            Statement::Delete(s) => self.execute_delete(s, *session),
            Statement::Begin => self.execute_begin(session),
            Statement::Commit => self.execute_commit(session),
            Statement::Rollback => self.execute_rollback(session),
        }
    }

    // ========== Transactions ==========

    fn execute_begin(&self, session: &mut Option<TxId>) -> Result<QueryResult> {
        if let Some(id) = *session {
            if self.transactions.is_active(id) {
                return Err(Error::TransactionInProgress(id));
            }
        }
        let id = self.transactions.begin();
        *session = Some(id);
        Ok(QueryResult::with_message(format!("Transaction {} started", id)))
    }

    fn execute_commit(&self, session: &mut Option<TxId>) -> Result<QueryResult> {
        let id = session.take().ok_or(Error::NoActiveTransaction)?;
        if !self.transactions.commit(id) {
            return Err(Error::TransactionNotActive(id));
        }
        Ok(QueryResult::with_message(format!("Transaction {} committed", id)))
    }

    fn execute_rollback(&self, session: &mut Option<TxId>) -> Result<QueryResult> {
        let id = session.take().ok_or(Error::NoActiveTransaction)?;
        if !self.rollback(id) {
            return Err(Error::TransactionNotActive(id));
        }
        Ok(QueryResult::with_message(format!("Transaction {} rolled back", id)))
    }

    /// Undo every change logged by `tx_id`, newest first.
    /// Returns `false` for unknown or finished transactions.
    pub fn rollback(&self, tx_id: TxId) -> bool {
        let mut touched = HashSet::new();
        let done = self.transactions.rollback(tx_id, |op| {
            touched.insert(op.table().to_string());
            let handle = self.table(op.table())?;
            let mut data = handle.lock();
            data.ensure_live()?;
            apply_undo(&mut data, op)
        });

        for table in touched {
            self.refresh_row_count(&table);
        }
        done
    }

    fn check_tx(&self, tx: Option<TxId>) -> Result<()> {
        match tx {
            Some(id) if !self.transactions.is_active(id) => Err(Error::TransactionNotActive(id)),
            _ => Ok(()),
        }
    }

    // ========== DDL ==========

    fn execute_create_table(&self, stmt: CreateTableStatement) -> Result<QueryResult> {
        let name = stmt.table_name;
        check_table_name(&name)?;
        let mut tables = self.tables.write();

        if self.catalog.table_exists(&name) {
            if stmt.if_not_exists {
                return Ok(QueryResult::with_message(format!(
                    "Table '{}' already exists, skipped",
                    name
                )));
            }
            return Err(Error::TableAlreadyExists(name));
        }

        let columns = stmt
            .columns
            .iter()
            .map(|def| {
                let mut col = Column::new(&def.name, def.data_type.clone())
                    .nullable(!def.not_null)
                    .primary_key(def.primary_key)
                    .unique(def.unique);
                if let Some(default) = &def.default {
                    col = col.default(default.clone());
                }
                col
            })
            .collect();
        let schema = Schema::new(&name, columns)?;
        let entry = TableEntry::new(&name, schema.clone(), automatic_indexes(&name, &schema));

        let mut data = TableData::create(&self.data_dir, &entry, self.options)?;
        if let Err(e) = self.catalog.create_table(entry) {
            if let Err(cleanup) = data.drop_files() {
                tracing::warn!(table = %name, error = %cleanup, "could not remove table files");
            }
            return Err(e);
        }
        self.registry.register(&name, schema);
        tables.insert(name.clone(), data.into_handle());

        tracing::info!(table = %name, "table created");
        Ok(QueryResult::with_message(format!("Table '{}' created", name)))
    }

    fn execute_drop_table(&self, stmt: DropTableStatement) -> Result<QueryResult> {
        let name = stmt.table_name;
        let mut tables = self.tables.write();

        if !self.catalog.table_exists(&name) {
            if stmt.if_exists {
                return Ok(QueryResult::with_message(format!(
                    "Table '{}' does not exist, skipped",
                    name
                )));
            }
            return Err(Error::TableNotFound(name));
        }

        self.catalog.drop_table(&name)?;
        self.registry.drop(&name);
        match tables.remove(&name) {
            Some(handle) => handle.lock().drop_files()?,
            None => {
                file::remove_if_exists(&RowStore::file_path(&self.data_dir, &name))?;
                file::remove_if_exists(&IndexManager::file_path(&self.data_dir, &name))?;
            }
        }

        tracing::info!(table = %name, "table dropped");
        Ok(QueryResult::with_message(format!("Table '{}' dropped", name)))
    }

    fn execute_create_index(&self, stmt: CreateIndexStatement) -> Result<QueryResult> {
        check_index_name(&stmt.index_name)?;
        let mut tables = self.tables.write();

        let entry = self
            .catalog
            .get_table(&stmt.table_name)
            .ok_or_else(|| Error::TableNotFound(stmt.table_name.clone()))?;
        if self.catalog.find_index(&stmt.index_name).is_some() {
            if stmt.if_not_exists {
                return Ok(QueryResult::with_message(format!(
                    "Index '{}' already exists, skipped",
                    stmt.index_name
                )));
            }
            return Err(Error::IndexAlreadyExists(stmt.index_name));
        }
        if !entry.schema.has_column(&stmt.column) {
            return Err(Error::ColumnNotFound(stmt.column, stmt.table_name));
        }

        let def =
            IndexDef::new(&stmt.index_name, &stmt.table_name, &stmt.column).unique(stmt.unique);
        let handle = self.load_table(&mut tables, &stmt.table_name)?;
        let mut data = handle.lock();
        let rows = data.store.scan();
        data.indexes.add_index(&def, &rows)?;
        if let Err(e) = self.catalog.add_index(def) {
            data.indexes.remove_index(&stmt.index_name)?;
            return Err(e);
        }

        tracing::info!(index = %stmt.index_name, table = %stmt.table_name, "index created");
        Ok(QueryResult::with_message(format!(
            "Index '{}' created on {}({})",
            stmt.index_name, stmt.table_name, stmt.column
        )))
    }

    fn execute_drop_index(&self, stmt: DropIndexStatement) -> Result<QueryResult> {
        let mut tables = self.tables.write();

        let def = self.catalog.find_index(&stmt.index_name).filter(|d| {
            stmt.table_name
                .as_ref()
                .map_or(true, |t| *t == d.table_name)
        });
        let Some(def) = def else {
            if stmt.if_exists {
                return Ok(QueryResult::with_message(format!(
                    "Index '{}' does not exist, skipped",
                    stmt.index_name
                )));
            }
            return Err(Error::IndexNotFound(stmt.index_name));
        };
        if def.primary {
            return Err(Error::InvalidSchema(format!(
                "cannot drop primary key index '{}'",
                def.name
            )));
        }

        let handle = self.load_table(&mut tables, &def.table_name)?;
        let mut data = handle.lock();
        data.indexes.remove_index(&def.name)?;
        if let Err(e) = self.catalog.remove_index(&def.table_name, &def.name) {
            let rows = data.store.scan();
            data.indexes.add_index(&def, &rows)?;
            return Err(e);
        }

        tracing::info!(index = %def.name, table = %def.table_name, "index dropped");
        Ok(QueryResult::with_message(format!("Index '{}' dropped", def.name)))
    }

    // ========== INSERT ==========

    fn execute_insert(&self, stmt: InsertStatement, tx: Option<TxId>) -> Result<QueryResult> {
        self.check_tx(tx)?;
        let table = stmt.table_name;
        let schema = self.schema(&table)?;

        let columns = match stmt.columns {
            Some(cols) => {
                let mut seen = HashSet::new();
                for col in &cols {
                    if !seen.insert(col.as_str()) {
                        return Err(Error::DuplicateColumn(col.clone(), table.clone()));
                    }
                }
                cols
            }
            None => schema.column_names(),
        };

        // validate every row before writing any
        let mut records = Vec::with_capacity(stmt.rows.len());
        for values in stmt.rows {
            if values.len() != columns.len() {
                return Err(Error::InvalidSchema(format!(
                    "INSERT into '{}' names {} columns but supplies {} values",
                    table,
                    columns.len(),
                    values.len()
                )));
            }
            let raw: Record = columns.iter().cloned().zip(values).collect();
            records.push(self.registry.validate(&table, &raw)?);
        }

        let handle = self.table(&table)?;
        let mut data = handle.lock();
        data.ensure_live()?;

        let mut undo = Vec::with_capacity(records.len());
        let mut last_row_id = None;
        for record in records {
            match data.insert(record) {
                Ok(row_id) => {
                    undo.push(UndoOp::Inserted {
                        table: table.clone(),
                        row_id,
                    });
                    last_row_id = Some(row_id);
                }
                Err(e) => {
                    compensate(&mut data, undo);
                    return Err(e);
                }
            }
        }
        let inserted = undo.len();
        self.finish_write(&mut data, &table, tx, undo)?;
        drop(data);

        let message = match (inserted, last_row_id) {
            (1, Some(id)) => format!("1 row inserted (ID: {})", id),
            (n, _) => format!("{} rows inserted", n),
        };
        let mut result = QueryResult::with_affected_rows(inserted, message);
        result.last_row_id = last_row_id;
        Ok(result)
    }

    // ========== UPDATE ==========

    fn execute_update(&self, stmt: UpdateStatement, tx: Option<TxId>) -> Result<QueryResult> {
        self.check_tx(tx)?;
        let table = stmt.table_name;
        let schema = self.schema(&table)?;

        let mut assignments = Record::with_capacity(stmt.assignments.len());
        for a in stmt.assignments {
            if !schema.has_column(&a.column) {
                return Err(Error::ColumnNotFound(a.column, table));
            }
            assignments.insert(a.column, a.value);
        }

        let scope = Scope::single(&TableRef::new(&table), &schema);
        let conditions = bind_conditions(&scope, &stmt.conditions)?;

        let handle = self.table(&table)?;
        let mut data = handle.lock();
        data.ensure_live()?;

        let rows = ScanPlan::choose(&data, conditions).fetch(&data);
        let mut updates = Vec::with_capacity(rows.len());
        for row in rows {
            let values = schema.validate_update(&table, &row.data, &assignments)?;
            updates.push((row.row_id, values));
        }

        let mut undo = Vec::with_capacity(updates.len());
        for (row_id, values) in updates {
            match data.update(row_id, values) {
                Ok(Some(prior)) => undo.push(UndoOp::Updated {
                    table: table.clone(),
                    row_id,
                    prior,
                }),
                Ok(None) => {}
                Err(e) => {
                    compensate(&mut data, undo);
                    return Err(e);
                }
            }
        }
        let updated = undo.len();
        self.finish_write(&mut data, &table, tx, undo)?;
        drop(data);
        Ok(QueryResult::with_affected_rows(
            updated,
            format!("{} row(s) updated", updated),
        ))
    }

    // ========== DELETE ==========

    fn execute_delete(&self, stmt: DeleteStatement, tx: Option<TxId>) -> Result<QueryResult> {
        self.check_tx(tx)?;
        let table = stmt.table_name;
        let schema = self.schema(&table)?;

        let scope = Scope::single(&TableRef::new(&table), &schema);
        let conditions = bind_conditions(&scope, &stmt.conditions)?;

        let handle = self.table(&table)?;
        let mut data = handle.lock();
        data.ensure_live()?;

        let rows = ScanPlan::choose(&data, conditions).fetch(&data);
        let mut undo = Vec::with_capacity(rows.len());
        for row in rows {
            match data.remove(row.row_id) {
                Ok(Some(row)) => undo.push(UndoOp::Deleted {
                    table: table.clone(),
                    row,
                }),
                Ok(None) => {}
                Err(e) => {
                    compensate(&mut data, undo);
                    return Err(e);
                }
            }
        }
        let deleted = undo.len();
        self.finish_write(&mut data, &table, tx, undo)?;
        drop(data);
        Ok(QueryResult::with_affected_rows(
            deleted,
            format!("{} row(s) deleted", deleted),
        ))
    }

    /// Record statistics and log `undo` to `tx` while the table is still
    /// locked. If either step fails the statement's writes are compensated.
    fn finish_write(
        &self,
        data: &mut TableData,
        table: &str,
        tx: Option<TxId>,
        undo: Vec<UndoOp>,
    ) -> Result<()> {
        if let Err(e) = self.catalog.record_write(table, data.store.count()) {
            compensate(data, undo);
            return Err(e);
        }
        let Some(tx) = tx else {
            return Ok(());
        };
        if let Err(e) = self.transactions.log(tx, undo.iter().cloned()) {
            compensate(data, undo);
            if let Err(stats) = self.catalog.record_write(table, data.store.count()) {
                tracing::warn!(table, error = %stats, "could not restore catalog statistics");
            }
            return Err(e);
        }
        Ok(())
    }

    // ========== SELECT ==========

    fn execute_select(&self, stmt: SelectStatement) -> Result<QueryResult> {
        if stmt.joins.is_empty() {
            self.execute_single_select(stmt)
        } else {
            self.execute_join_select(stmt)
        }
    }

    fn execute_single_select(&self, stmt: SelectStatement) -> Result<QueryResult> {
        let schema = self.schema(&stmt.from.name)?;
        let scope = Scope::single(&stmt.from, &schema);
        let conditions = bind_conditions(&scope, &stmt.conditions)?;

        let handle = self.table(&stmt.from.name)?;
        let rows: Vec<Record> = {
            let data = handle.lock();
            data.ensure_live()?;
            ScanPlan::choose(&data, conditions)
                .fetch(&data)
                .into_iter()
                .map(|row| row.data)
                .collect()
        };

        finish_select(&scope, &stmt, rows)
    }

    fn execute_join_select(&self, stmt: SelectStatement) -> Result<QueryResult> {
        let base_schema = self.schema(&stmt.from.name)?;
        let mut scope = Scope::default();
        scope.push_qualified(&stmt.from, &base_schema);

        // resolve every join before touching data
        let mut steps = Vec::with_capacity(stmt.joins.len());
        for join in &stmt.joins {
            let schema = self.schema(&join.table.name)?;
            let reference = join.table.reference_name();
            if scope.has_qualifier(reference) {
                return Err(Error::InvalidSchema(format!(
                    "table reference '{}' is used more than once",
                    reference
                )));
            }
            let mut inner_scope = Scope::default();
            inner_scope.push_qualified(&join.table, &schema);

            let (outer, inner) = join_sides(&scope, &inner_scope, join)?;
            scope.push_qualified(&join.table, &schema);
            steps.push((join, schema, outer, inner));
        }
        let conditions = bind_conditions(&scope, &stmt.conditions)?;

        let mut rows: Vec<Record> = {
            let handle = self.table(&stmt.from.name)?;
            let data = handle.lock();
            data.ensure_live()?;
            data.store
                .scan()
                .iter()
                .map(|row| qualify(&stmt.from, &row.data))
                .collect()
        };

        for (join, schema, outer, inner) in steps {
            let handle = self.table(&join.table.name)?;
            let data = handle.lock();
            data.ensure_live()?;

            let index = data.indexes.index_for_column(&inner.column);
            let inner_rows = match index {
                Some(_) => Vec::new(),
                None => data.store.scan(),
            };
            tracing::debug!(
                table = %join.table.name,
                indexed = index.is_some(),
                "nested loop join"
            );

            let mut joined = Vec::new();
            for left in rows {
                let key = left.get(&outer.key).cloned().unwrap_or(Value::Null);
                let matches: Vec<Row> = if key.is_null() {
                    Vec::new()
                } else if let Some(idx) = index {
                    data.read_many(&idx.find_exact(&key))
                } else {
                    inner_rows
                        .iter()
                        .filter(|r| r.get(&inner.column).compare(&key) == Some(Ordering::Equal))
                        .cloned()
                        .collect()
                };

                if matches.is_empty() {
                    if join.join_type == JoinType::Left {
                        let mut padded = left;
                        for col in schema.columns() {
                            padded.insert(
                                format!("{}.{}", join.table.reference_name(), col.name),
                                Value::Null,
                            );
                        }
                        joined.push(padded);
                    }
                    continue;
                }
                for m in matches {
                    let mut combined = left.clone();
                    combined.extend(qualify(&join.table, &m.data));
                    joined.push(combined);
                }
            }
            rows = joined;
        }

        let rows = rows
            .into_iter()
            .filter(|r| conditions.iter().all(|c| c.matches(r)))
            .collect();
        finish_select(&scope, &stmt, rows)
    }

    // ========== Tables ==========

    fn schema(&self, table: &str) -> Result<std::sync::Arc<Schema>> {
        self.registry
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }

    /// Get a table handle, loading the table on first use
    pub fn table(&self, name: &str) -> Result<TableHandle> {
        if let Some(handle) = self.tables.read().get(name) {
            return Ok(handle.clone());
        }
        let mut tables = self.tables.write();
        self.load_table(&mut tables, name)
    }

    fn load_table(
        &self,
        tables: &mut HashMap<String, TableHandle>,
        name: &str,
    ) -> Result<TableHandle> {
        if let Some(handle) = tables.get(name) {
            return Ok(handle.clone());
        }
        let entry = self
            .catalog
            .get_table(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        let handle = TableData::load(&self.data_dir, &entry, self.options)?.into_handle();
        tables.insert(name.to_string(), handle.clone());
        tracing::debug!(table = name, "table loaded");
        Ok(handle)
    }

    /// Row count and per-index statistics of a table
    pub fn table_stats(&self, name: &str) -> Result<(usize, Vec<(String, IndexStats)>)> {
        let handle = self.table(name)?;
        let data = handle.lock();
        data.ensure_live()?;
        Ok((data.store.count(), data.indexes.stats()))
    }

    fn refresh_row_count(&self, table: &str) {
        let Ok(handle) = self.table(table) else {
            return;
        };
        let count = handle.lock().store.count();
        if let Err(e) = self.catalog.record_write(table, count) {
            tracing::warn!(table, error = %e, "could not update catalog statistics");
        }
    }

    /// Commit open transactions, write final statistics and release tables
    pub fn close(&self) -> Result<()> {
        self.transactions.commit_all();

        let mut tables = self.tables.write();
        let mut first_error = None;
        for (name, handle) in tables.iter() {
            let count = handle.lock().store.count();
            if let Err(e) = self.catalog.record_write(name, count) {
                tracing::warn!(table = %name, error = %e, "could not update catalog statistics");
                first_error.get_or_insert(e);
            }
        }
        tables.clear();
        self.catalog.save()?;
        first_error.map_or(Ok(()), Err)
    }
}

/// Indexes created with a table: one for the primary key, one per UNIQUE column
fn automatic_indexes(table: &str, schema: &Schema) -> Vec<IndexDef> {
    schema
        .columns()
        .iter()
        .filter_map(|col| {
            if col.primary_key {
                Some(
                    IndexDef::new(IndexDef::primary_key_name(table), table, &col.name)
                        .primary(true)
                        .automatic(true),
                )
            } else if col.unique {
                Some(
                    IndexDef::new(IndexDef::unique_column_name(table, &col.name), table, &col.name)
                        .unique(true)
                        .automatic(true),
                )
            } else {
                None
            }
        })
        .collect()
}

/// Reverse one logged change on an already locked table
pub(crate) fn apply_undo(data: &mut TableData, op: &UndoOp) -> Result<()> {
    match op {
        UndoOp::Inserted { row_id, .. } => {
            data.remove(*row_id)?;
        }
        UndoOp::Updated { row_id, prior, .. } => {
            data.update(*row_id, prior.clone())?;
        }
        UndoOp::Deleted { row, .. } => {
            if data.store.read(row.row_id).is_none() {
                data.reinsert(row.clone())?;
            }
        }
    }
    Ok(())
}

/// Undo the rows a failing statement already changed
fn compensate(data: &mut TableData, undo: Vec<UndoOp>) {
    for op in undo.iter().rev() {
        if let Err(e) = apply_undo(data, op) {
            tracing::warn!(table = op.table(), error = %e, "statement compensation failed");
        }
    }
}

/// Work out which side of `ON a = b` belongs to the table being joined
fn join_sides(
    outer_scope: &Scope,
    inner_scope: &Scope,
    join: &Join,
) -> Result<(ScopeColumn, ScopeColumn)> {
    let direct = outer_scope
        .resolve(&join.left)
        .and_then(|o| inner_scope.resolve(&join.right).map(|i| (o.clone(), i.clone())));
    match direct {
        Ok(sides) => Ok(sides),
        Err(first) => outer_scope
            .resolve(&join.right)
            .and_then(|o| inner_scope.resolve(&join.left).map(|i| (o.clone(), i.clone())))
            .map_err(|_| first),
    }
}

fn qualify(table: &TableRef, data: &Record) -> Record {
    let reference = table.reference_name();
    data.iter()
        .map(|(col, value)| (format!("{}.{}", reference, col), value.clone()))
        .collect()
}

/// ORDER BY, OFFSET, LIMIT and projection
fn finish_select(scope: &Scope, stmt: &SelectStatement, mut rows: Vec<Record>) -> Result<QueryResult> {
    let order: Vec<(String, bool)> = stmt
        .order_by
        .iter()
        .map(|item| Ok((scope.resolve(&item.column)?.key.clone(), item.ascending)))
        .collect::<Result<_>>()?;

    let columns: Vec<String> = match &stmt.projection {
        Projection::All => scope.columns().iter().map(|c| c.key.clone()).collect(),
        Projection::Columns(refs) => refs
            .iter()
            .map(|r| Ok(scope.resolve(r)?.key.clone()))
            .collect::<Result<_>>()?,
    };

    if !order.is_empty() {
        rows.sort_by(|a, b| {
            for (key, ascending) in &order {
                let av = a.get(key).unwrap_or(&Value::Null);
                let bv = b.get(key).unwrap_or(&Value::Null);
                let ord = av.total_cmp(bv);
                let ord = if *ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let rows = rows
        .into_iter()
        .skip(stmt.offset.unwrap_or(0))
        .take(stmt.limit.unwrap_or(usize::MAX))
        .map(|row| {
            columns
                .iter()
                .map(|key| (key.clone(), row.get(key).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect();

    Ok(QueryResult::with_rows(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;
    use tempfile::TempDir;

    fn engine(dir: &Path) -> ExecutionEngine {
        ExecutionEngine::open(dir, WriteOptions::default()).unwrap()
    }

    fn run(engine: &ExecutionEngine, sql: &str) -> Result<QueryResult> {
        let mut session = None;
        engine.execute(parse(sql)?, &mut session)
    }

    fn setup(engine: &ExecutionEngine) {
        run(
            engine,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(50) NOT NULL, \
             email VARCHAR(100) UNIQUE, age INTEGER)",
        )
        .unwrap();
        run(
            engine,
            "INSERT INTO users VALUES (1, 'Alice', 'a@x', 30), (2, 'Bob', 'b@x', 25), \
             (3, 'Carol', NULL, 35)",
        )
        .unwrap();
    }

    #[test]
    fn test_create_table_adds_automatic_indexes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let entry = engine.catalog().get_table("users").unwrap();
        let names: Vec<&str> = entry.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["pk_users", "uq_users_email"]);
        assert_eq!(entry.row_count, 3);
    }

    #[test]
    fn test_select_order_limit_offset() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let result = run(&engine, "SELECT name FROM users ORDER BY age DESC LIMIT 2 OFFSET 1").unwrap();
        assert_eq!(result.columns, vec!["name"]);
        let names: Vec<&Value> = result.rows.iter().map(|r| &r["name"]).collect();
        assert_eq!(names, vec![&Value::from("Alice"), &Value::from("Bob")]);
    }

    #[test]
    fn test_multi_row_insert_is_atomic() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let err = run(
            &engine,
            "INSERT INTO users VALUES (4, 'Dan', 'd@x', 20), (5, 'Eve', 'a@x', 22)",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueConstraintError);

        let result = run(&engine, "SELECT * FROM users").unwrap();
        assert_eq!(result.row_count(), 3);
        let (_, stats) = engine.table_stats("users").unwrap();
        assert!(stats.iter().all(|(_, s)| s.total_entries <= 3));
    }

    #[test]
    fn test_update_conflict_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let err = run(&engine, "UPDATE users SET email = 'same@x'").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UniqueConstraintError);

        let result = run(&engine, "SELECT email FROM users WHERE id = 1").unwrap();
        assert_eq!(result.rows[0]["email"], Value::from("a@x"));
        let result = run(&engine, "SELECT * FROM users WHERE email = 'same@x'").unwrap();
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_join_left() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);
        run(&engine, "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total FLOAT)").unwrap();
        run(&engine, "INSERT INTO orders VALUES (10, 1, 9.5), (11, 1, 3.0), (12, 2, 7.25)").unwrap();

        let result = run(
            &engine,
            "SELECT u.name, o.total FROM users u LEFT JOIN orders o ON u.id = o.user_id \
             ORDER BY u.id, o.total",
        )
        .unwrap();
        assert_eq!(result.columns, vec!["u.name", "o.total"]);
        assert_eq!(result.row_count(), 4);
        assert_eq!(result.rows[0]["o.total"], Value::Float(3.0));
        assert_eq!(result.rows[3]["u.name"], Value::from("Carol"));
        assert_eq!(result.rows[3]["o.total"], Value::Null);

        let inner = run(
            &engine,
            "SELECT * FROM orders o JOIN users u ON u.id = o.user_id WHERE u.name = 'Alice'",
        )
        .unwrap();
        assert_eq!(inner.row_count(), 2);
    }

    #[test]
    fn test_drop_primary_index_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let err = run(&engine, "DROP INDEX pk_users").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
        run(&engine, "DROP INDEX uq_users_email ON users").unwrap();
        assert!(engine.catalog().find_index("uq_users_email").is_none());
    }

    #[test]
    fn test_session_transaction_rollback() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let mut session = None;
        engine.execute(parse("BEGIN").unwrap(), &mut session).unwrap();
        assert!(session.is_some());
        engine
            .execute(parse("DELETE FROM users WHERE age > 26").unwrap(), &mut session)
            .unwrap();
        engine
            .execute(parse("UPDATE users SET name = 'Robert' WHERE id = 2").unwrap(), &mut session)
            .unwrap();
        engine.execute(parse("ROLLBACK").unwrap(), &mut session).unwrap();
        assert!(session.is_none());

        let result = run(&engine, "SELECT name FROM users ORDER BY id").unwrap();
        let names: Vec<&Value> = result.rows.iter().map(|r| &r["name"]).collect();
        assert_eq!(
            names,
            vec![&Value::from("Alice"), &Value::from("Bob"), &Value::from("Carol")]
        );
        assert_eq!(engine.catalog().get_table("users").unwrap().row_count, 3);
    }

    #[test]
    fn test_commit_without_begin() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        let err = run(&engine, "COMMIT").unwrap_err();
        assert!(matches!(err, Error::NoActiveTransaction));
    }

    #[test]
    fn test_writes_undone_when_transaction_ends_first() {
        let dir = TempDir::new().unwrap();
        let engine = engine(dir.path());
        setup(&engine);

        let tx = engine.transactions().begin();
        let raw: Record = [
            ("id".to_string(), Value::Integer(4)),
            ("name".to_string(), Value::from("Dan")),
            ("email".to_string(), Value::from("d@x")),
        ]
        .into_iter()
        .collect();
        let record = engine.registry.validate("users", &raw).unwrap();

        let handle = engine.table("users").unwrap();
        let mut data = handle.lock();
        let row_id = data.insert(record).unwrap();
        // another session commits the transaction before the write is logged
        assert!(engine.transactions().commit(tx));
        let undo = vec![UndoOp::Inserted {
            table: "users".to_string(),
            row_id,
        }];
        let err = engine
            .finish_write(&mut data, "users", Some(tx), undo)
            .unwrap_err();
        drop(data);

        assert!(matches!(err, Error::TransactionNotActive(id) if id == tx));
        assert_eq!(run(&engine, "SELECT * FROM users").unwrap().row_count(), 3);
        let result = run(&engine, "SELECT * FROM users WHERE email = 'd@x'").unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(engine.catalog().get_table("users").unwrap().row_count, 3);
        // the key is free again
        run(&engine, "INSERT INTO users VALUES (4, 'Dan', 'd@x', 40)").unwrap();
    }

    #[test]
    fn test_catalog_write_failure_fails_statement() {
        let dir = TempDir::new().unwrap();
        // a directory in place of the temp file makes every catalog save fail
        let blocker = dir.path().join("catalog.json.tmp");
        {
            let engine = engine(dir.path());
            setup(&engine);
            std::fs::create_dir(&blocker).unwrap();

            let err = run(&engine, "INSERT INTO users VALUES (4, 'Dan', 'd@x', 40)").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IOError);
            let err = run(&engine, "DELETE FROM users WHERE id = 1").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IOError);

            let result = run(&engine, "SELECT * FROM users").unwrap();
            assert_eq!(result.row_count(), 3);
            let (count, stats) = engine.table_stats("users").unwrap();
            assert_eq!(count, 3);
            assert!(stats.iter().all(|(_, s)| s.total_entries <= 3));
            assert!(engine.close().is_err());
        }

        std::fs::remove_dir(&blocker).unwrap();
        let engine = engine(dir.path());
        assert_eq!(run(&engine, "SELECT * FROM users").unwrap().row_count(), 3);
        run(&engine, "INSERT INTO users VALUES (4, 'Dan', 'd@x', 40)").unwrap();
        assert_eq!(engine.catalog().get_table("users").unwrap().row_count, 4);
    }
}
