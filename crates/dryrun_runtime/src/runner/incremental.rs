//! Incremental models.
//!
//! The predicted SELECT only describes the rows of one run. When the target
//! already exists (and the run is not a full refresh) the schema the model
//! ends up with depends on the target and on `on_schema_change`, so the
//! runner probes the merge and then applies the policy.

use super::{preprocess_and_query, schema_change, NodeRunner, RunContext};
use crate::error::RuntimeResult;
use crate::preprocess::Preprocessor;
use crate::result::DryRunResult;
use async_trait::async_trait;
use dryrun_core::{Field, FieldType, Table};
use dryrun_plan::Node;
use dryrun_sql::{has_recursive_cte, merge_sql, table_to_literal};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Pseudo-column added to ingestion-time partitioned tables
pub const PARTITION_TIME_COLUMN: &str = "_PARTITIONTIME";

/// Runs incremental models against their existing target
#[derive(Debug, Clone)]
pub struct IncrementalRunner {
    preprocessor: Preprocessor,
}

impl IncrementalRunner {
    /// Runner with the incremental pipeline
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessor: Preprocessor::incremental(),
        }
    }

    /// Dry run a `MERGE` of the predicted rows into the target
    ///
    /// Skipped when nothing is shared with the target or the model uses a
    /// recursive CTE. A rejected probe fails the node without a table.
    async fn verify_merge(
        &self,
        node: &Arc<Node>,
        ctx: &RunContext,
        result: DryRunResult,
        target: &Table,
    ) -> RuntimeResult<DryRunResult> {
        let Some(predicted) = &result.table else {
            return Ok(result);
        };
        if has_recursive_cte(&node.compiled_code) {
            return Ok(result);
        }
        let common = predicted.common_field_names(target);
        if common.is_empty() {
            return Ok(result);
        }
        let select = table_to_literal(predicted, ctx.config.literal_mode);
        let sql = merge_sql(&node.table_ref(), common.iter().map(String::as_str), &select);
        let probe = DryRunResult::from_outcome(Arc::clone(node), ctx.warehouse.query(&sql).await?);
        if probe.is_success() {
            Ok(result)
        } else {
            debug!(node = %node.unique_id, "Merge probe rejected");
            Ok(probe)
        }
    }
}

impl Default for IncrementalRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn with_partition_time(result: DryRunResult) -> DryRunResult {
    match &result.table {
        Some(table) => {
            let column = Field::new(PARTITION_TIME_COLUMN, FieldType::Timestamp);
            let table = table.with_appended([column]);
            result.replace_table(table)
        }
        None => result,
    }
}

#[async_trait]
impl NodeRunner for IncrementalRunner {
    #[instrument(skip_all, fields(node = %node.unique_id))]
    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        let mut result = preprocess_and_query(&self.preprocessor, node, ctx).await?;

        if result.is_success() && !node.should_full_refresh(ctx.config.full_refresh) {
            if let Some(target) = ctx.warehouse.get_node_schema(&node.table_ref()).await? {
                result = self.verify_merge(node, ctx, result, &target).await?;
                if result.is_success() {
                    let policy = node.config.on_schema_change.unwrap_or_default();
                    result = schema_change::apply(policy, result, &target);
                }
            }
        }

        if result.is_success() && node.is_time_ingestion_partitioned() {
            result = with_partition_time(result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DryRunStatus;
    use dryrun_core::RunConfig;
    use dryrun_plan::{
        Materialization, NodeConfig, OnSchemaChange, PartitionBy, PartitionDataType, ResourceType,
    };
    use dryrun_warehouse::{MemoryWarehouse, QueryOutcome, RejectionKind};

    fn table(names: &[&str]) -> Table {
        Table::new(names.iter().map(|n| Field::new(*n, FieldType::String)).collect())
    }

    fn node(config: NodeConfig, sql: &str) -> Arc<Node> {
        Arc::new(
            Node::new("model.inc", ResourceType::Model)
                .with_alias("inc")
                .with_config(config)
                .with_compiled_code(sql),
        )
    }

    fn incremental(policy: OnSchemaChange) -> NodeConfig {
        let mut config = NodeConfig::materialized(Materialization::Incremental);
        config.on_schema_change = Some(policy);
        config
    }

    fn warehouse(predicted: &[&str], target: Option<&[&str]>) -> Arc<MemoryWarehouse> {
        let mut warehouse = MemoryWarehouse::new()
            .with_default_response(Ok(QueryOutcome::Success(table(predicted))));
        if let Some(target) = target {
            warehouse = warehouse.with_table(
                dryrun_core::TableRef::new("my_db", "my_schema", "inc"),
                table(target),
            );
        }
        Arc::new(warehouse)
    }

    async fn run(node: &Arc<Node>, warehouse: Arc<MemoryWarehouse>, config: RunConfig) -> DryRunResult {
        let ctx = RunContext::new(warehouse, config);
        IncrementalRunner::new().run(node, &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_no_target_returns_prediction() {
        let wh = warehouse(&["a", "b"], None);
        let node = node(incremental(OnSchemaChange::Fail), "SELECT a, b FROM x");
        let result = run(&node, wh.clone(), RunConfig::default()).await;
        assert_eq!(result.table, Some(table(&["a", "b"])));
        assert_eq!(wh.query_count(), 1);
    }

    #[tokio::test]
    async fn test_merge_probe_then_policy() {
        let wh = warehouse(&["a", "c"], Some(&["a", "b"]));
        let node = node(incremental(OnSchemaChange::AppendNewColumns), "SELECT a, c FROM x");
        let result = run(&node, wh.clone(), RunConfig::default()).await;
        assert!(result.is_success());
        assert_eq!(result.table, Some(table(&["a", "b", "c"])));
        let queries = wh.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].starts_with("MERGE `my_db`.`my_schema`.`inc`"));
        assert!(queries[1].contains("INSERT (a)"));
    }

    #[tokio::test]
    async fn test_rejected_merge_fails_without_table() {
        let wh = MemoryWarehouse::new()
            .on_query(
                "MERGE",
                Ok(QueryOutcome::rejected(RejectionKind::BadRequest, "Value has type STRING")),
            )
            .with_default_response(Ok(QueryOutcome::Success(table(&["a"]))))
            .with_table(dryrun_core::TableRef::new("my_db", "my_schema", "inc"), table(&["a"]));
        let node = node(incremental(OnSchemaChange::Ignore), "SELECT a FROM x");
        let result = run(&node, Arc::new(wh), RunConfig::default()).await;
        assert_eq!(result.status, DryRunStatus::Failure);
        assert!(result.table.is_none());
        assert_eq!(result.error.unwrap().to_string(), "Value has type STRING");
    }

    #[tokio::test]
    async fn test_recursive_cte_skips_merge() {
        let wh = warehouse(&["a"], Some(&["a"]));
        let node = node(
            incremental(OnSchemaChange::Ignore),
            "WITH RECURSIVE r AS (SELECT 1 AS a) SELECT a FROM r",
        );
        let result = run(&node, wh.clone(), RunConfig::default()).await;
        assert!(result.is_success());
        assert_eq!(wh.query_count(), 1);
    }

    #[tokio::test]
    async fn test_full_refresh_skips_target() {
        let wh = warehouse(&["a", "c"], Some(&["a", "b"]));
        let node = node(incremental(OnSchemaChange::Fail), "SELECT a, c FROM x");
        let result = run(&node, wh.clone(), RunConfig::default().with_full_refresh(true)).await;
        assert!(result.is_success());
        assert_eq!(result.table, Some(table(&["a", "c"])));
        assert_eq!(wh.query_count(), 1);
    }

    #[tokio::test]
    async fn test_node_full_refresh_override_wins() {
        let wh = warehouse(&["a", "c"], Some(&["a", "b"]));
        let mut config = incremental(OnSchemaChange::Fail);
        config.full_refresh = Some(false);
        let node = node(config, "SELECT a, c FROM x");
        let result = run(&node, wh, RunConfig::default().with_full_refresh(true)).await;
        assert_eq!(result.error.unwrap().kind(), "SchemaChange");
    }

    #[tokio::test]
    async fn test_time_ingestion_partition_column() {
        let wh = warehouse(&["a"], None);
        let mut config = incremental(OnSchemaChange::Ignore);
        config.partition_by = Some(PartitionBy {
            field: "ts".to_string(),
            data_type: PartitionDataType::Timestamp,
            range: None,
            time_ingestion_partitioning: Some(true),
        });
        let node = node(config, "SELECT a FROM x");
        let result = run(&node, wh, RunConfig::default()).await;
        let table = result.table.unwrap();
        let last = table.fields.last().unwrap();
        assert_eq!(last.name, PARTITION_TIME_COLUMN);
        assert_eq!(last.field_type, FieldType::Timestamp);
    }
}
