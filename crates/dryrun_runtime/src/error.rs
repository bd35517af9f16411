//! Runtime errors.
//!
//! [`NodeError`] is captured inside a node's result and never stops the run.
//! [`RuntimeError`] aborts the run.

use dryrun_plan::{ColumnError, PlanError};
use dryrun_warehouse::{Rejection, RejectionKind, WarehouseError};

/// Runtime result type
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Why a single node failed or was skipped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// Node has no compiled SQL
    #[error("Node {node_id} was not compiled")]
    NotCompiled {
        /// Node id
        node_id: String,
    },

    /// A dependency did not succeed
    #[error(
        "Can't insert SELECT literals for {node_id}. Upstreams did not run with status: {}",
        .upstreams.join(", ")
    )]
    UpstreamFailed {
        /// Node id
        node_id: String,
        /// `<id> : <STATUS>` for each failed dependency
        upstreams: Vec<String>,
    },

    /// Warehouse refused the dry run query
    #[error("{message}")]
    QueryRejected {
        /// Rejection class
        kind: RejectionKind,
        /// Warehouse message
        message: String,
    },

    /// Incremental model drifted under `on_schema_change: fail`
    #[error(
        "Incremental model has changed schemas. Fields added: {{{}}}, Fields removed: {{{}}}",
        .added.join(", "),
        .removed.join(", ")
    )]
    SchemaChange {
        /// Predicted columns missing from the target
        added: Vec<String>,
        /// Target columns missing from the prediction
        removed: Vec<String>,
    },

    /// Snapshot config refers to columns the snapshot does not produce
    #[error("{message}")]
    SnapshotConfig {
        /// Details
        message: String,
    },

    /// Non-external source not found in the warehouse
    #[error("Could not find source in target environment for node '{node_id}'")]
    SourceMissing {
        /// Node id
        node_id: String,
    },

    /// Declared columns can't be arranged into a schema
    #[error("{message}")]
    InvalidColumnSpecification {
        /// Details
        message: String,
    },

    /// Declared column type missing or unknown
    #[error("{message}")]
    UnknownDataType {
        /// Details
        message: String,
    },

    /// Schema uses a type the schema model does not cover
    #[error("{message}")]
    UnknownSchema {
        /// Details
        message: String,
    },

    /// Seed file could not be read or parsed
    #[error("Could not read seed file '{path}': {reason}")]
    SeedRead {
        /// File path
        path: String,
        /// Underlying reason
        reason: String,
    },
}

impl NodeError {
    /// Classification shown in failure summaries
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotCompiled { .. } => "NotCompiled",
            Self::UpstreamFailed { .. } => "UpstreamFailed",
            Self::QueryRejected { kind, .. } => kind.as_str(),
            Self::SchemaChange { .. } => "SchemaChange",
            Self::SnapshotConfig { .. } => "SnapshotConfig",
            Self::SourceMissing { .. } => "SourceMissing",
            Self::InvalidColumnSpecification { .. } => "InvalidColumnSpecification",
            Self::UnknownDataType { .. } => "UnknownDataType",
            Self::UnknownSchema { .. } => "UnknownSchema",
            Self::SeedRead { .. } => "SeedRead",
        }
    }
}

impl From<Rejection> for NodeError {
    fn from(rejection: Rejection) -> Self {
        match rejection.kind {
            RejectionKind::UnknownSchema => Self::UnknownSchema {
                message: rejection.message,
            },
            kind => Self::QueryRejected {
                kind,
                message: rejection.message,
            },
        }
    }
}

impl From<ColumnError> for NodeError {
    fn from(err: ColumnError) -> Self {
        match err {
            ColumnError::InvalidColumnSpecification(message) => {
                Self::InvalidColumnSpecification { message }
            }
            ColumnError::UnknownDataType(message) => Self::UnknownDataType { message },
        }
    }
}

/// Error that aborts the run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Planning failed
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Warehouse unreachable or persistently timing out
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    /// No runner handles this resource type and materialization
    #[error("Unknown node runner for resource_type '{resource_type}' materialized '{materialized}'")]
    UnknownRunner {
        /// Resource type
        resource_type: String,
        /// Materialization, `none` when unset
        materialized: String,
    },

    /// Snapshot with a composite unique key
    #[error(
        "Cannot dry run node '{node_id}' because it is a snapshot with a list of unique keys '[{}]'",
        .keys.join(", ")
    )]
    SnapshotUniqueKeyList {
        /// Node id
        node_id: String,
        /// Configured keys
        keys: Vec<String>,
    },

    /// Snapshot strategy other than `timestamp` or `check`
    #[error("Unknown snapshot strategy: '{strategy}'")]
    UnknownSnapshotStrategy {
        /// Node id
        node_id: String,
        /// Configured strategy, `None` when unset
        strategy: String,
    },

    /// A node task failed unexpectedly
    #[error("Node {node_id} raised unhandled error: {source}")]
    NodeExecution {
        /// Node id
        node_id: String,
        /// What went wrong
        #[source]
        source: Box<RuntimeError>,
    },

    /// A node task panicked or was cancelled
    #[error("Task failed: {message}")]
    TaskFailed {
        /// Join error message
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_failed_message() {
        let err = NodeError::UpstreamFailed {
            node_id: "model.b".to_string(),
            upstreams: vec!["model.a : FAILURE".to_string(), "seed.s : SKIPPED".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Can't insert SELECT literals for model.b. Upstreams did not run with status: model.a : FAILURE, seed.s : SKIPPED"
        );
    }

    #[test]
    fn test_schema_change_message() {
        let err = NodeError::SchemaChange {
            added: vec!["c".to_string()],
            removed: vec!["b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Incremental model has changed schemas. Fields added: {c}, Fields removed: {b}"
        );
    }

    #[test]
    fn test_rejection_kinds() {
        let err = NodeError::from(Rejection::new(RejectionKind::Forbidden, "denied"));
        assert_eq!(err.kind(), "Forbidden");
        assert_eq!(err.to_string(), "denied");

        let err = NodeError::from(Rejection::new(RejectionKind::UnknownSchema, "bad type"));
        assert!(matches!(err, NodeError::UnknownSchema { .. }));
    }

    #[test]
    fn test_column_errors_convert() {
        let err = NodeError::from(ColumnError::UnknownDataType("no type".to_string()));
        assert_eq!(err.kind(), "UnknownDataType");
    }

    #[test]
    fn test_node_execution_wraps_source() {
        let err = RuntimeError::NodeExecution {
            node_id: "model.a".to_string(),
            source: Box::new(RuntimeError::Warehouse(WarehouseError::RetriesExhausted {
                attempts: 5,
                message: "Dry run query timed out".to_string(),
            })),
        };
        assert!(err.to_string().starts_with("Node model.a raised unhandled error"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
