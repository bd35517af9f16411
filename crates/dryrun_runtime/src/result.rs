//! Per-node dry run results.

use crate::error::NodeError;
use dryrun_core::Table;
use dryrun_plan::Node;
use dryrun_warehouse::QueryOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of dry running a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DryRunStatus {
    /// Schema predicted
    Success,
    /// Node failed
    Failure,
    /// Node not attempted
    Skipped,
}

impl DryRunStatus {
    /// Upper-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for DryRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of column linting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LintingStatus {
    /// No violations
    Success,
    /// At least one violation
    Failure,
    /// Linting not enabled for the node, or no table to lint
    #[default]
    Skipped,
}

/// One linting violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintingError {
    /// Rule name
    pub rule: String,
    /// Message
    pub message: String,
}

/// Result of dry running one node
#[derive(Debug, Clone, PartialEq)]
pub struct DryRunResult {
    /// The node
    pub node: Arc<Node>,
    /// Predicted schema
    pub table: Option<Table>,
    /// Status
    pub status: DryRunStatus,
    /// Failure or skip reason
    pub error: Option<NodeError>,
    /// Linting status
    pub linting_status: LintingStatus,
    /// Linting violations
    pub linting_errors: Vec<LintingError>,
}

impl DryRunResult {
    fn new(
        node: Arc<Node>,
        table: Option<Table>,
        status: DryRunStatus,
        error: Option<NodeError>,
    ) -> Self {
        Self {
            node,
            table,
            status,
            error,
            linting_status: LintingStatus::Skipped,
            linting_errors: Vec::new(),
        }
    }

    /// Successful prediction
    #[must_use]
    pub fn success(node: Arc<Node>, table: Table) -> Self {
        Self::new(node, Some(table), DryRunStatus::Success, None)
    }

    /// Success with no schema to pass downstream
    #[must_use]
    pub fn without_table(node: Arc<Node>) -> Self {
        Self::new(node, None, DryRunStatus::Success, None)
    }

    /// Failure without a table
    #[must_use]
    pub fn failure(node: Arc<Node>, error: NodeError) -> Self {
        Self::new(node, None, DryRunStatus::Failure, Some(error))
    }

    /// Failure that still carries the predicted table
    #[must_use]
    pub fn failure_with_table(node: Arc<Node>, table: Table, error: NodeError) -> Self {
        Self::new(node, Some(table), DryRunStatus::Failure, Some(error))
    }

    /// Node not attempted
    #[must_use]
    pub fn skipped(node: Arc<Node>, reason: NodeError) -> Self {
        Self::new(node, None, DryRunStatus::Skipped, Some(reason))
    }

    /// Result of a dry run query
    #[must_use]
    pub fn from_outcome(node: Arc<Node>, outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Success(table) => Self::success(node, table),
            QueryOutcome::Rejected(rejection) => Self::failure(node, rejection.into()),
        }
    }

    /// Same result with another table
    #[must_use]
    pub fn replace_table(&self, table: Table) -> Self {
        Self::new(
            Arc::clone(&self.node),
            Some(table),
            self.status,
            self.error.clone(),
        )
    }

    /// Same result with linting applied
    #[must_use]
    pub fn with_linting_errors(mut self, linting_errors: Vec<LintingError>) -> Self {
        self.linting_status = if linting_errors.is_empty() {
            LintingStatus::Success
        } else {
            LintingStatus::Failure
        };
        self.linting_errors = linting_errors;
        self
    }

    /// Whether the node succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == DryRunStatus::Success
    }

    /// Node id
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.node.unique_id
    }
}
