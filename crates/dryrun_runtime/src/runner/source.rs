//! Sources.

use super::{NodeRunner, RunContext};
use crate::error::{NodeError, RuntimeResult};
use crate::result::DryRunResult;
use async_trait::async_trait;
use dryrun_core::Table;
use dryrun_plan::{map_column_list_to_table, map_columns_to_table, ColumnError, Node};
use std::sync::Arc;
use tracing::debug;

/// External sources get their schema from declared columns; other sources
/// only need to exist in the warehouse.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceRunner;

fn external_schema(node: &Node) -> Result<Table, ColumnError> {
    match &node.external {
        Some(external) if !external.dry_run_columns.is_empty() => {
            map_column_list_to_table(&external.dry_run_columns)
        }
        _ => map_columns_to_table(&node.columns),
    }
}

#[async_trait]
impl NodeRunner for SourceRunner {
    fn requires_compilation(&self) -> bool {
        false
    }

    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        if node.is_external_source() {
            return Ok(match external_schema(node) {
                Ok(table) => DryRunResult::success(Arc::clone(node), table),
                Err(err) => DryRunResult::failure(Arc::clone(node), err.into()),
            });
        }
        if ctx.warehouse.node_exists(&node.table_ref()).await? {
            return Ok(DryRunResult::without_table(Arc::clone(node)));
        }
        debug!(node = %node.unique_id, "Source not found");
        Ok(DryRunResult::failure(
            Arc::clone(node),
            NodeError::SourceMissing {
                node_id: node.unique_id.clone(),
            },
        ))
    }
}
