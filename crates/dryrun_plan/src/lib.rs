//! dryrun planner
//!
//! Loads the project manifest and turns it into the graph of nodes that can
//! be dry run: runnable filtering, deep dependencies through ephemeral and
//! disabled nodes, model/tag selection and language checks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod columns;
pub mod dag;
pub mod error;
pub mod manifest;
pub mod validate;

pub use columns::{expand_table_fields, map_column_list_to_table, map_columns_to_table, ColumnError};
pub use dag::{is_runnable, Dag, DeepDependencies, NodeFilter};
pub use error::{PlanError, PlanResult};
pub use manifest::{
    CheckCols, DependsOn, ExternalConfig, HardDeletes, IntPartitionRange, Manifest, ManifestColumn,
    Materialization, Node, NodeConfig, OnSchemaChange, PartitionBy, PartitionDataType, ResourceType,
    UniqueKey, CHECK_COLUMNS_META_KEY,
};
pub use validate::validate_manifest_compatibility;
