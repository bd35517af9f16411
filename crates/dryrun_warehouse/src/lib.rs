//! dryrun warehouse adapters
//!
//! This crate abstracts the warehouse behind the async [`Warehouse`] trait
//! and provides a BigQuery REST adapter, an in-memory warehouse, and a
//! retrying wrapper for planner timeouts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigquery;
pub mod memory;
pub mod retry;
pub mod schema;
pub mod warehouse;

// Re-exports
pub use bigquery::{BigQueryConfig, BigQueryWarehouse, QUERY_TIMED_OUT};
pub use memory::MemoryWarehouse;
pub use retry::{RetryPolicy, RetryingWarehouse, MAX_ATTEMPT_NUMBER};
pub use schema::{RawField, RawSchema, UnknownSchemaError};
pub use warehouse::{
    QueryOutcome, Rejection, RejectionKind, Warehouse, WarehouseError, WarehouseResult,
};
