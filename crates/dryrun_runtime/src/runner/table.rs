//! Table models.

use super::{preprocess_and_query, NodeRunner, RunContext};
use crate::error::RuntimeResult;
use crate::preprocess::Preprocessor;
use crate::result::DryRunResult;
use async_trait::async_trait;
use dryrun_plan::Node;
use std::sync::Arc;

/// Dry runs the model's SELECT as is
#[derive(Debug, Clone)]
pub struct TableRunner {
    preprocessor: Preprocessor,
}

impl TableRunner {
    /// Runner with the table pipeline
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessor: Preprocessor::table(),
        }
    }
}

impl Default for TableRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for TableRunner {
    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        preprocess_and_query(&self.preprocessor, node, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DryRunStatus;
    use dryrun_core::{Field, FieldType, RunConfig, Table};
    use dryrun_plan::{Materialization, ResourceType};
    use dryrun_warehouse::{MemoryWarehouse, QueryOutcome, RejectionKind, WarehouseError};

    fn node() -> Arc<Node> {
        Arc::new(
            Node::new("model.t", ResourceType::Model)
                .with_materialized(Materialization::Table)
                .with_compiled_code("SELECT a FROM x"),
        )
    }

    #[tokio::test]
    async fn test_success_carries_predicted_table() {
        let predicted = Table::new(vec![Field::new("a", FieldType::Int64)]);
        let warehouse = Arc::new(
            MemoryWarehouse::new().with_default_response(Ok(QueryOutcome::Success(predicted.clone()))),
        );
        let ctx = RunContext::new(warehouse.clone(), RunConfig::default());
        let result = TableRunner::new().run(&node(), &ctx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.table, Some(predicted));
        assert_eq!(warehouse.queries(), vec!["SELECT a FROM x"]);
    }

    #[tokio::test]
    async fn test_rejection_is_a_node_failure() {
        let warehouse = MemoryWarehouse::new().with_default_response(Ok(QueryOutcome::rejected(
            RejectionKind::BadRequest,
            "Unrecognized name: a",
        )));
        let ctx = RunContext::new(Arc::new(warehouse), RunConfig::default());
        let result = TableRunner::new().run(&node(), &ctx).await.unwrap();
        assert_eq!(result.status, DryRunStatus::Failure);
        assert_eq!(result.error.unwrap().kind(), "BadRequest");
    }

    #[tokio::test]
    async fn test_warehouse_fault_aborts() {
        let warehouse = MemoryWarehouse::new().with_default_response(Err(WarehouseError::Transport {
            message: "connection reset".to_string(),
        }));
        let ctx = RunContext::new(Arc::new(warehouse), RunConfig::default());
        assert!(TableRunner::new().run(&node(), &ctx).await.is_err());
    }
}
