//! Transaction module
//!
//! Undo-log transactions driven by the executor.

pub mod transaction;

pub use transaction::{Transaction, TransactionManager, TransactionState, TxId, UndoOp};
