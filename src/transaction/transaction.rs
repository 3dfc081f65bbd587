//! Transaction Manager
//!
//! Handles transaction lifecycle (Begin, Commit, Rollback). A transaction is
//! an ordered undo log of row changes; rolling back replays it newest first.
//! There is no isolation: other sessions see uncommitted rows.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::storage::{Record, Row, RowId};

/// Transaction identifier
pub type TxId = u64;

/// Transaction State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// How to reverse one row change
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOp {
    /// A row was inserted; undo deletes it
    Inserted { table: String, row_id: RowId },
    /// A row was updated; undo restores the prior values
    Updated {
        table: String,
        row_id: RowId,
        prior: Record,
    },
    /// A row was deleted; undo re-inserts it with its original id
    Deleted { table: String, row: Row },
}

impl UndoOp {
    /// Table the change applies to
    pub fn table(&self) -> &str {
        match self {
            UndoOp::Inserted { table, .. }
            | UndoOp::Updated { table, .. }
            | UndoOp::Deleted { table, .. } => table,
        }
    }
}

/// Transaction Context
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxId,
    pub state: TransactionState,
    pub undo_log: Vec<UndoOp>,
}

impl Transaction {
    fn new(id: TxId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            undo_log: Vec::new(),
        }
    }
}

/// Transaction Manager
///
/// Only active transactions are tracked; commit and rollback remove them.
pub struct TransactionManager {
    /// Active Transactions
    transactions: Mutex<HashMap<TxId, Transaction>>,
    /// Next Transaction ID
    next_trans_id: Mutex<TxId>,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            next_trans_id: Mutex::new(1),
        }
    }

    /// Begin a new transaction
    pub fn begin(&self) -> TxId {
        let trans_id = {
            let mut next = self.next_trans_id.lock();
            let id = *next;
            *next += 1;
            id
        };

        self.transactions
            .lock()
            .insert(trans_id, Transaction::new(trans_id));
        tracing::info!(tx = trans_id, "transaction started");

        trans_id
    }

    /// Append undo records to an active transaction
    pub fn log(&self, trans_id: TxId, ops: impl IntoIterator<Item = UndoOp>) -> Result<()> {
        let mut transactions = self.transactions.lock();
        let trans = transactions
            .get_mut(&trans_id)
            .ok_or(Error::TransactionNotActive(trans_id))?;
        trans.undo_log.extend(ops);
        Ok(())
    }

    /// Commit a transaction. Returns `false` for unknown or finished ids.
    pub fn commit(&self, trans_id: TxId) -> bool {
        let Some(mut trans) = self.transactions.lock().remove(&trans_id) else {
            return false;
        };
        trans.state = TransactionState::Committed;
        tracing::info!(tx = trans_id, changes = trans.undo_log.len(), "transaction committed");
        true
    }

    /// Roll back a transaction, handing each undo record to `undo` newest
    /// first. A failing record is logged and the rest still run.
    /// Returns `false` for unknown or finished ids.
    pub fn rollback(&self, trans_id: TxId, mut undo: impl FnMut(&UndoOp) -> Result<()>) -> bool {
        let Some(mut trans) = self.transactions.lock().remove(&trans_id) else {
            return false;
        };

        for op in trans.undo_log.iter().rev() {
            if let Err(e) = undo(op) {
                tracing::warn!(tx = trans_id, table = op.table(), error = %e, "undo step failed");
            }
        }

        trans.state = TransactionState::RolledBack;
        tracing::info!(tx = trans_id, changes = trans.undo_log.len(), "transaction rolled back");
        true
    }

    /// Check if transaction is active
    pub fn is_active(&self, trans_id: TxId) -> bool {
        self.transactions.lock().contains_key(&trans_id)
    }

    /// Number of undo records logged so far
    pub fn log_len(&self, trans_id: TxId) -> Option<usize> {
        self.transactions
            .lock()
            .get(&trans_id)
            .map(|t| t.undo_log.len())
    }

    /// Ids of all active transactions, ascending
    pub fn active(&self) -> Vec<TxId> {
        let mut ids: Vec<TxId> = self.transactions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Commit every active transaction; used on shutdown
    pub fn commit_all(&self) -> usize {
        let drained: Vec<TxId> = self.transactions.lock().drain().map(|(id, _)| id).collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "committed open transactions on close");
        }
        drained.len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inserted(row_id: RowId) -> UndoOp {
        UndoOp::Inserted {
            table: "t".to_string(),
            row_id,
        }
    }

    #[test]
    fn test_begin_commit() {
        let tm = TransactionManager::new();
        let t1 = tm.begin();
        let t2 = tm.begin();
        assert_ne!(t1, t2);
        assert_eq!(tm.active(), vec![t1, t2]);

        assert!(tm.commit(t1));
        assert!(!tm.is_active(t1));
        assert!(!tm.commit(t1));
        assert!(tm.is_active(t2));
    }

    #[test]
    fn test_rollback_replays_in_reverse() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tm.log(tx, [inserted(1), inserted(2)]).unwrap();
        tm.log(tx, [inserted(3)]).unwrap();
        assert_eq!(tm.log_len(tx), Some(3));

        let mut seen = Vec::new();
        assert!(tm.rollback(tx, |op| {
            if let UndoOp::Inserted { row_id, .. } = op {
                seen.push(*row_id);
            }
            Ok(())
        }));
        assert_eq!(seen, vec![3, 2, 1]);
        assert!(!tm.rollback(tx, |_| Ok(())));
    }

    #[test]
    fn test_rollback_continues_after_failed_step() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tm.log(tx, [inserted(1), inserted(2)]).unwrap();

        let mut calls = 0;
        assert!(tm.rollback(tx, |_| {
            calls += 1;
            Err(Error::TableNotFound("t".to_string()))
        }));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_log_to_finished_transaction_fails() {
        let tm = TransactionManager::new();
        let tx = tm.begin();
        tm.commit(tx);
        assert!(matches!(
            tm.log(tx, [inserted(1)]),
            Err(Error::TransactionNotActive(_))
        ));
    }

    #[test]
    fn test_commit_all() {
        let tm = TransactionManager::new();
        tm.begin();
        tm.begin();
        assert_eq!(tm.commit_all(), 2);
        assert!(tm.active().is_empty());
    }
}
