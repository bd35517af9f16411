//! Planning errors.
//!
//! Everything in here is fatal: a run never starts, or stops before any
//! node executes.

/// Plan result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Fatal planning error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Manifest file does not exist
    #[error("Incorrect Manifest filepath: '{path}'")]
    ManifestNotFound {
        /// Path as given
        path: String,
    },

    /// Manifest could not be read or decoded
    #[error("Failed to load manifest '{path}': {reason}")]
    ManifestLoad {
        /// Path as given
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// Nodes using a language other than SQL
    #[error("Manifest nodes failed validation due to:\n{}", format_unsupported(.nodes))]
    UnsupportedLanguage {
        /// Offending node ids
        nodes: Vec<String>,
    },

    /// Cycle in the runnable dependency graph
    #[error("Cycle detected in dependency graph involving nodes: {}", .nodes.join(", "))]
    CycleDetected {
        /// Nodes left over once every acyclic node was removed
        nodes: Vec<String>,
    },

    /// Model filter names a node that is not in the manifest
    #[error("Model {model} does not exist in manifest. Runnable nodes: {}", .alternatives.join(", "))]
    ModelNotFound {
        /// Requested model id
        model: String,
        /// Runnable node ids the user could have meant
        alternatives: Vec<String>,
    },

    /// Model filter names a node that can not be dry run
    #[error("Model {model} is not runnable: resource_type={resource_type}, materialized={materialized}")]
    ModelNotRunnable {
        /// Requested model id
        model: String,
        /// Node resource type
        resource_type: String,
        /// Node materialization
        materialized: String,
    },

    /// Tag filter matched nothing runnable
    #[error("No runnable nodes are tagged with any of: {}", .tags.join(", "))]
    NoNodesForTags {
        /// Requested tags
        tags: Vec<String>,
    },
}

fn format_unsupported(nodes: &[String]) -> String {
    nodes
        .iter()
        .map(|id| format!("NODE_NOT_SQL : Only SQL language models are supported : {}", id))
        .collect::<Vec<_>>()
        .join("\n")
}
