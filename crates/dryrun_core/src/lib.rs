//! dryrun core types
//!
//! This crate contains pure types and logic with no I/O: the warehouse
//! schema model, table references, run configuration and timing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod schema;
pub mod table_ref;
pub mod time;

// Re-exports
pub use config::{LiteralMode, RunConfig};
pub use error::{CoreError, CoreResult};
pub use schema::{Field, FieldMode, FieldType, Table};
pub use table_ref::TableRef;
pub use time::{Duration, Timestamp};
