//! Index engine
//!
//! Sorted single-column indexes and the per-table manager that keeps them
//! in step with the row store.

pub mod btree;
pub mod manager;

pub use btree::{BTreeIndex, IndexEntry, IndexStats};
pub use manager::IndexManager;
