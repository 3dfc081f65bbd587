//! Row filtering
//!
//! Column references are resolved against a [`Scope`] that maps each
//! visible column to the key it has in a working record. Condition literals
//! are converted to the declared column type up front so comparisons and
//! index lookups see values of the same kind as stored ones.

use std::cmp::Ordering;

use crate::catalog::{DataType, Schema};
use crate::error::{Error, Result};
use crate::sql::ast::{ColumnRef, CompareOp, Condition, Predicate, TableRef};
use crate::storage::{Record, Value};

/// A column visible to a statement
#[derive(Debug, Clone)]
pub struct ScopeColumn {
    /// Alias or table name the column can be qualified with
    pub qualifier: String,
    /// Underlying table name
    pub table: String,
    pub column: String,
    pub data_type: DataType,
    /// Key of the column in working records
    pub key: String,
}

/// Columns visible to a statement, in output order
#[derive(Debug, Clone, Default)]
pub struct Scope {
    columns: Vec<ScopeColumn>,
}

impl Scope {
    /// Scope of a single-table statement; record keys are bare column names
    pub fn single(table: &TableRef, schema: &Schema) -> Self {
        let mut scope = Self::default();
        scope.push_table(table, schema, false);
        scope
    }

    /// Add a table whose record keys are `<qualifier>.<column>`
    pub fn push_qualified(&mut self, table: &TableRef, schema: &Schema) {
        self.push_table(table, schema, true);
    }

    fn push_table(&mut self, table: &TableRef, schema: &Schema, qualified: bool) {
        let qualifier = table.reference_name().to_string();
        for col in schema.columns() {
            let key = if qualified {
                format!("{}.{}", qualifier, col.name)
            } else {
                col.name.clone()
            };
            self.columns.push(ScopeColumn {
                qualifier: qualifier.clone(),
                table: table.name.clone(),
                column: col.name.clone(),
                data_type: col.data_type.clone(),
                key,
            });
        }
    }

    /// All visible columns
    pub fn columns(&self) -> &[ScopeColumn] {
        &self.columns
    }

    /// Whether any column is qualified by `qualifier`
    pub fn has_qualifier(&self, qualifier: &str) -> bool {
        self.columns.iter().any(|c| c.qualifier == qualifier)
    }

    /// Resolve a column reference. A qualifier may be the alias or the
    /// table name; a bare name must match exactly one visible column.
    pub fn resolve(&self, col: &ColumnRef) -> Result<&ScopeColumn> {
        let mut matches = self.columns.iter().filter(|c| {
            c.column == col.column
                && match &col.table {
                    Some(t) => &c.qualifier == t || &c.table == t,
                    None => true,
                }
        });

        let first = matches.next().ok_or_else(|| {
            let table = col
                .table
                .clone()
                .or_else(|| self.columns.first().map(|c| c.table.clone()))
                .unwrap_or_default();
            Error::ColumnNotFound(col.column.clone(), table)
        })?;
        if matches.next().is_some() {
            return Err(Error::InvalidSchema(format!(
                "column reference '{}' is ambiguous",
                col
            )));
        }
        Ok(first)
    }
}

/// A condition resolved against a scope, literals converted to the
/// column's type
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCondition {
    /// Record key of the tested column
    pub key: String,
    /// Column name in its table, used to find an index
    pub column: String,
    pub predicate: Predicate,
    /// Whether every literal converted cleanly to the column type
    pub exact: bool,
}

impl BoundCondition {
    /// Whether an index on the column can answer this condition
    pub fn is_index_candidate(&self) -> bool {
        match &self.predicate {
            Predicate::Compare(op, value) => self.exact && op.is_index_friendly() && !value.is_null(),
            _ => false,
        }
    }

    /// Test a working record
    pub fn matches(&self, record: &Record) -> bool {
        let value = record.get(&self.key).unwrap_or(&Value::Null);
        evaluate(&self.predicate, value)
    }
}

/// Resolve and bind WHERE terms
pub fn bind_conditions(scope: &Scope, conditions: &[Condition]) -> Result<Vec<BoundCondition>> {
    conditions
        .iter()
        .map(|cond| {
            let col = scope.resolve(&cond.column)?;
            let (predicate, exact) = bind_predicate(&col.data_type, &cond.predicate);
            Ok(BoundCondition {
                key: col.key.clone(),
                column: col.column.clone(),
                predicate,
                exact,
            })
        })
        .collect()
}

fn bind_predicate(data_type: &DataType, predicate: &Predicate) -> (Predicate, bool) {
    match predicate {
        Predicate::Compare(op, value) => {
            let (value, exact) = bind_literal(data_type, value);
            (Predicate::Compare(*op, value), exact)
        }
        Predicate::In(values) => {
            let mut all_exact = true;
            let values = values
                .iter()
                .map(|v| {
                    let (v, exact) = bind_literal(data_type, v);
                    all_exact &= exact;
                    v
                })
                .collect();
            (Predicate::In(values), all_exact)
        }
        other => (other.clone(), true),
    }
}

/// Convert a literal to the column type; a literal that does not convert is
/// kept as written and simply never compares equal
fn bind_literal(data_type: &DataType, value: &Value) -> (Value, bool) {
    match data_type.coerce(value) {
        Some(v) => (v, true),
        None => (value.clone(), false),
    }
}

/// Evaluate a predicate against one value. Comparisons involving NULL are
/// false; only IS NULL / IS NOT NULL look at NULL.
pub fn evaluate(predicate: &Predicate, value: &Value) -> bool {
    match predicate {
        Predicate::IsNull => value.is_null(),
        Predicate::IsNotNull => !value.is_null(),
        Predicate::Compare(op, literal) => match value.compare(literal) {
            Some(ord) => compare_op_holds(*op, ord),
            None => false,
        },
        Predicate::In(list) => list
            .iter()
            .any(|lit| value.compare(lit) == Some(Ordering::Equal)),
        Predicate::Like(pattern) => match value {
            Value::Null => false,
            Value::Text(s) => like_match(s, pattern),
            other => like_match(&other.to_string(), pattern),
        },
    }
}

fn compare_op_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::NotEq => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::LtEq => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::GtEq => ord != Ordering::Less,
    }
}

/// SQL LIKE over the whole value: `%` matches any run of characters, `_`
/// exactly one. Case-sensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // position of the last '%' in the pattern and the text index it resumes at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((star, resume)) = backtrack {
            p = star + 1;
            t = resume + 1;
            backtrack = Some((star, resume + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}
