//! Query execution module
//!
//! This module contains the execution engine, access path selection,
//! row filtering and the loaded-table wrapper that keeps rows and indexes
//! in step.

pub mod executor;
pub mod filter;
pub mod planner;
pub mod table;

pub use executor::{ExecutionEngine, QueryResult};
pub use planner::{AccessPath, ScanPlan};
pub use table::{TableData, TableHandle};
