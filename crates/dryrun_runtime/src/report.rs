//! Run report and console summary.

use crate::result::{DryRunResult, DryRunStatus, LintingError, LintingStatus};
use crate::results::Results;
use console::style;
use dryrun_core::Table;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use tracing::warn;

/// One node in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNode {
    /// Node id
    pub unique_id: String,
    /// Whether the node succeeded
    pub success: bool,
    /// Status
    pub status: DryRunStatus,
    /// Failure message
    pub error_message: Option<String>,
    /// Predicted schema
    pub table: Option<Table>,
    /// Linting status
    pub linting_status: LintingStatus,
    /// Linting violations
    pub linting_errors: Vec<LintingError>,
}

impl From<&DryRunResult> for ReportNode {
    fn from(result: &DryRunResult) -> Self {
        Self {
            unique_id: result.unique_id().to_string(),
            success: result.is_success(),
            status: result.status,
            error_message: result.error.as_ref().map(ToString::to_string),
            table: result.table.clone(),
            linting_status: result.linting_status,
            linting_errors: result.linting_errors.clone(),
        }
    }
}

/// Machine-readable report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// No node failed
    pub success: bool,
    /// Wall time in seconds
    pub execution_time: f64,
    /// Nodes with a result
    pub node_count: usize,
    /// Nodes that did not succeed
    pub failure_count: usize,
    /// Ids of nodes that did not succeed
    pub failed_node_ids: Vec<String>,
    /// Per-node details
    pub nodes: Vec<ReportNode>,
}

impl Report {
    /// Build the report from a finished run
    #[must_use]
    pub fn from_results(results: &Results) -> Self {
        let nodes: Vec<ReportNode> = results.values().iter().map(ReportNode::from).collect();
        let failed_node_ids: Vec<String> = nodes
            .iter()
            .filter(|n| !n.success)
            .map(|n| n.unique_id.clone())
            .collect();
        Self {
            success: failed_node_ids.is_empty(),
            execution_time: results.duration().as_secs_f64(),
            node_count: nodes.len(),
            failure_count: failed_node_ids.len(),
            failed_node_ids,
            nodes,
        }
    }

    /// Write the report as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if the file can't be written
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Prints failures and the final verdict
pub struct ResultReporter<'a> {
    results: &'a Results,
    exclude: IndexSet<String>,
}

impl<'a> ResultReporter<'a> {
    /// Reporter over a finished run
    #[must_use]
    pub fn new(results: &'a Results) -> Self {
        Self {
            results,
            exclude: IndexSet::new(),
        }
    }

    /// Failures of these nodes do not fail the run
    #[must_use]
    pub fn with_exclude(mut self, exclude: impl IntoIterator<Item = String>) -> Self {
        self.exclude = exclude.into_iter().collect();
        self
    }

    /// Print the summary and return the exit code
    ///
    /// # Errors
    ///
    /// Returns error if writing to `out` fails
    pub fn report(&self, out: &mut impl Write) -> io::Result<i32> {
        let failures: Vec<(DryRunResult, bool)> = self
            .results
            .values()
            .into_iter()
            .filter(|r| r.status != DryRunStatus::Success)
            .map(|r| {
                let excluded = self.exclude.contains(r.unique_id());
                (r, excluded)
            })
            .collect();

        for (failure, _) in &failures {
            let message = failure
                .error
                .as_ref()
                .map_or_else(String::new, ToString::to_string);
            warn!(node = %failure.unique_id(), status = %failure.status, "Node failed: {}", message);
        }

        if !failures.is_empty() {
            writeln!(out, "Total {} failures:", failures.len())?;
            for (index, (failure, excluded)) in failures.iter().enumerate() {
                let kind = failure.error.as_ref().map_or("UNKNOWN", |e| e.kind());
                let verdict = if *excluded { "EXCLUDED" } else { "ERROR" };
                writeln!(
                    out,
                    "{}\t:\t{}\t:\t{}\t:\t{}",
                    index + 1,
                    failure.unique_id(),
                    kind,
                    verdict
                )?;
            }
        }

        let included = failures.iter().filter(|(_, excluded)| !excluded).count();
        if included > 0 {
            writeln!(out, "{}", style("DRY RUN FAILURE!").red().bold())?;
            Ok(1)
        } else if failures.is_empty() {
            writeln!(out, "{}", style("DRY RUN SUCCESS!").green().bold())?;
            Ok(0)
        } else {
            writeln!(
                out,
                "{}",
                style("DRY RUN SUCCESS! (With excluded failures)").green().bold()
            )?;
            Ok(0)
        }
    }
}
