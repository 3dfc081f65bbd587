//! Access path selection
//!
//! Rule-based: the first WHERE term, in written order, that compares an
//! indexed column with `=` or a range operator drives an index lookup.
//! Every other term is applied afterwards as a residual filter.

use super::filter::BoundCondition;
use super::table::TableData;
use crate::sql::ast::{CompareOp, Predicate};
use crate::storage::{Row, Value};

/// How rows are fetched from the base table
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// Read every row in id order
    FullScan,
    /// Point lookup on an index
    IndexExact { index: String, key: Value },
    /// Bounded walk over an index in key order
    IndexRange {
        index: String,
        low: Option<Value>,
        high: Option<Value>,
        low_inclusive: bool,
        high_inclusive: bool,
    },
}

/// Chosen access path plus the terms it does not cover
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub access: AccessPath,
    pub residual: Vec<BoundCondition>,
}

impl ScanPlan {
    /// Pick an access path for `conditions` over `table`
    pub fn choose(table: &TableData, conditions: Vec<BoundCondition>) -> Self {
        let chosen = conditions.iter().enumerate().find_map(|(pos, cond)| {
            if !cond.is_index_candidate() {
                return None;
            }
            let index = table.indexes.index_for_column(&cond.column)?;
            let Predicate::Compare(op, value) = &cond.predicate else {
                return None;
            };
            Some((pos, index_path(&index.name, *op, value.clone())))
        });

        match chosen {
            Some((pos, access)) => {
                let mut residual = conditions;
                residual.remove(pos);
                tracing::debug!(
                    table = table.store.table_name(),
                    access = ?access,
                    residual = residual.len(),
                    "index access path"
                );
                Self { access, residual }
            }
            None => {
                tracing::debug!(table = table.store.table_name(), "full scan");
                Self {
                    access: AccessPath::FullScan,
                    residual: conditions,
                }
            }
        }
    }

    /// Fetch the candidate rows and apply the residual filter
    pub fn fetch(&self, table: &TableData) -> Vec<Row> {
        let rows = match &self.access {
            AccessPath::FullScan => table.store.scan(),
            AccessPath::IndexExact { index, key } => match table.indexes.get(index) {
                Some(idx) => table.read_many(&idx.find_exact(key)),
                None => table.store.scan(),
            },
            AccessPath::IndexRange {
                index,
                low,
                high,
                low_inclusive,
                high_inclusive,
            } => match table.indexes.get(index) {
                Some(idx) => table.read_many(&idx.find_range(
                    low.as_ref(),
                    high.as_ref(),
                    *low_inclusive,
                    *high_inclusive,
                )),
                None => table.store.scan(),
            },
        };

        rows.into_iter()
            .filter(|row| self.residual.iter().all(|c| c.matches(&row.data)))
            .collect()
    }
}

fn index_path(index: &str, op: CompareOp, value: Value) -> AccessPath {
    let index = index.to_string();
    match op {
        CompareOp::Eq => AccessPath::IndexExact { index, key: value },
        CompareOp::Lt | CompareOp::LtEq => AccessPath::IndexRange {
            index,
            low: None,
            high: Some(value),
            low_inclusive: false,
            high_inclusive: op == CompareOp::LtEq,
        },
        CompareOp::Gt | CompareOp::GtEq => AccessPath::IndexRange {
            index,
            low: Some(value),
            high: None,
            low_inclusive: op == CompareOp::GtEq,
            high_inclusive: false,
        },
        // never chosen: is_index_candidate rejects it
        CompareOp::NotEq => AccessPath::FullScan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, IndexDef, Schema, TableEntry};
    use crate::executor::filter::{bind_conditions, Scope};
    use crate::sql::ast::{ColumnRef, Condition, TableRef};
    use crate::storage::{Record, WriteOptions};
    use tempfile::TempDir;

    fn setup(dir: &std::path::Path) -> (TableData, Scope) {
        let schema = Schema::new(
            "items",
            vec![
                Column::new("id", DataType::Integer).primary_key(true),
                Column::new("price", DataType::Float),
                Column::new("name", DataType::Text),
            ],
        )
        .unwrap();
        let entry = TableEntry::new(
            "items",
            schema.clone(),
            vec![
                IndexDef::new("pk_items", "items", "id").primary(true),
                IndexDef::new("idx_price", "items", "price"),
            ],
        );
        let mut table = TableData::create(dir, &entry, WriteOptions::default()).unwrap();
        for (id, price) in [(1, 5.0), (2, 15.0), (3, 25.0), (4, 15.0)] {
            let mut r = Record::new();
            r.insert("id".into(), Value::Integer(id));
            r.insert("price".into(), Value::Float(price));
            r.insert("name".into(), Value::from(format!("item{}", id)));
            table.insert(r).unwrap();
        }
        let scope = Scope::single(
            &TableRef {
                name: "items".into(),
                alias: None,
            },
            &schema,
        );
        (table, scope)
    }

    fn cond(column: &str, predicate: Predicate) -> Condition {
        Condition {
            column: ColumnRef::new(column),
            predicate,
        }
    }

    #[test]
    fn test_first_indexed_condition_wins() {
        let dir = TempDir::new().unwrap();
        let (table, scope) = setup(dir.path());

        let conds = bind_conditions(
            &scope,
            &[
                cond("name", Predicate::Like("item%".into())),
                cond("price", Predicate::Compare(CompareOp::GtEq, Value::Integer(15))),
                cond("id", Predicate::Compare(CompareOp::Eq, Value::Integer(4))),
            ],
        )
        .unwrap();
        let plan = ScanPlan::choose(&table, conds);

        assert!(matches!(
            plan.access,
            AccessPath::IndexRange { ref index, low_inclusive: true, .. } if index == "idx_price"
        ));
        assert_eq!(plan.residual.len(), 2);

        let ids: Vec<u64> = plan.fetch(&table).iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn test_range_returns_key_order() {
        let dir = TempDir::new().unwrap();
        let (table, scope) = setup(dir.path());

        let conds = bind_conditions(
            &scope,
            &[cond("price", Predicate::Compare(CompareOp::Gt, Value::Float(5.0)))],
        )
        .unwrap();
        let plan = ScanPlan::choose(&table, conds);
        let ids: Vec<u64> = plan.fetch(&table).iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    #[test]
    fn test_unindexed_or_not_equal_scans() {
        let dir = TempDir::new().unwrap();
        let (table, scope) = setup(dir.path());

        let conds = bind_conditions(
            &scope,
            &[
                cond("id", Predicate::Compare(CompareOp::NotEq, Value::Integer(1))),
                cond("name", Predicate::Compare(CompareOp::Eq, Value::from("item3"))),
            ],
        )
        .unwrap();
        let plan = ScanPlan::choose(&table, conds);

        assert_eq!(plan.access, AccessPath::FullScan);
        let ids: Vec<u64> = plan.fetch(&table).iter().map(|r| r.row_id).collect();
        assert_eq!(ids, vec![3]);
    }
}
