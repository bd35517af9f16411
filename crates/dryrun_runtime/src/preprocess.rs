//! SQL preprocessing pipelines.
//!
//! A node's compiled SQL goes through an ordered list of steps before it is
//! sent to the warehouse. Upstream substitution is the only step that can
//! fail: when a dependency did not succeed there is no schema to substitute.

use crate::error::NodeError;
use crate::runner::RunContext;
use dryrun_plan::Node;
use dryrun_sql::{
    add_max_partition_declaration, add_sql_header, create_or_replace_view,
    replace_upstream_reference, table_to_literal,
};
use tracing::debug;

/// One transformation of the SQL text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Replace upstream references with literal subqueries
    SubstituteUpstreams,
    /// Prepend `config.sql_header`
    SqlHeader,
    /// Wrap in `CREATE OR REPLACE VIEW`
    CreateView,
    /// Declare `_dbt_max_partition` when referenced
    MaxPartition,
}

/// An ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessor {
    steps: Vec<Step>,
}

impl Preprocessor {
    /// Pipeline from explicit steps
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Tables: substitute, header
    #[must_use]
    pub fn table() -> Self {
        Self::new(vec![Step::SubstituteUpstreams, Step::SqlHeader])
    }

    /// Views: substitute, view wrap, header
    #[must_use]
    pub fn view() -> Self {
        Self::new(vec![Step::SubstituteUpstreams, Step::CreateView, Step::SqlHeader])
    }

    /// Incremental models: substitute, header, max partition
    #[must_use]
    pub fn incremental() -> Self {
        Self::new(vec![
            Step::SubstituteUpstreams,
            Step::SqlHeader,
            Step::MaxPartition,
        ])
    }

    /// Snapshots and tests: substitute only
    #[must_use]
    pub fn substitute_only() -> Self {
        Self::new(vec![Step::SubstituteUpstreams])
    }

    /// Steps in order
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step over the node's compiled SQL
    ///
    /// # Errors
    ///
    /// Returns `UpstreamFailed` if a dependency did not succeed
    pub fn run(&self, node: &Node, ctx: &RunContext) -> Result<String, NodeError> {
        let mut sql = node.compiled_code.clone();
        for step in &self.steps {
            sql = apply(*step, &sql, node, ctx)?;
        }
        debug!(node = %node.unique_id, sql = %sql, "Preprocessed SQL");
        Ok(sql)
    }
}

fn apply(step: Step, sql: &str, node: &Node, ctx: &RunContext) -> Result<String, NodeError> {
    Ok(match step {
        Step::SubstituteUpstreams => substitute_upstreams(sql, node, ctx)?,
        Step::SqlHeader => add_sql_header(sql, node.config.sql_header.as_deref()),
        Step::CreateView => create_or_replace_view(sql, &node.table_ref()),
        Step::MaxPartition => add_max_partition_declaration(
            sql,
            &node.compiled_code,
            node.config.partition_by.as_ref().map(|p| p.data_type),
        ),
    })
}

/// Replace references to every finished dependency with its literal
///
/// # Errors
///
/// Returns `UpstreamFailed` naming every dependency that did not succeed
pub fn substitute_upstreams(sql: &str, node: &Node, ctx: &RunContext) -> Result<String, NodeError> {
    let upstream_results: Vec<_> = ctx
        .dependencies_of(&node.unique_id)
        .iter()
        .filter_map(|id| ctx.results.get(id))
        .collect();

    let failed: Vec<String> = upstream_results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| format!("{} : {}", r.unique_id(), r.status))
        .collect();
    if !failed.is_empty() {
        return Err(NodeError::UpstreamFailed {
            node_id: node.unique_id.clone(),
            upstreams: failed,
        });
    }

    let mut rewritten = sql.to_string();
    for upstream in &upstream_results {
        let Some(table) = &upstream.table else {
            continue;
        };
        let literal = table_to_literal(table, ctx.config.literal_mode);
        rewritten = replace_upstream_reference(
            &rewritten,
            &upstream.node.table_ref(),
            upstream.node.alias(),
            &literal,
        );
    }
    Ok(rewritten)
}
