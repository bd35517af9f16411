//! View models.

use super::{preprocess_and_query, NodeRunner, RunContext};
use crate::error::RuntimeResult;
use crate::preprocess::Preprocessor;
use crate::result::DryRunResult;
use async_trait::async_trait;
use dryrun_plan::Node;
use std::sync::Arc;

/// Dry runs `CREATE OR REPLACE VIEW` so view-only rules are checked
#[derive(Debug, Clone)]
pub struct ViewRunner {
    preprocessor: Preprocessor,
}

impl ViewRunner {
    /// Runner with the view pipeline
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessor: Preprocessor::view(),
        }
    }
}

impl Default for ViewRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRunner for ViewRunner {
    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        preprocess_and_query(&self.preprocessor, node, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dryrun_core::RunConfig;
    use dryrun_plan::{Materialization, ResourceType};
    use dryrun_warehouse::MemoryWarehouse;

    #[tokio::test]
    async fn test_query_wrapped_in_view() {
        let node = Arc::new(
            Node::new("model.v", ResourceType::Model)
                .with_materialized(Materialization::View)
                .with_alias("v")
                .with_compiled_code("SELECT 1 AS a"),
        );
        let warehouse = Arc::new(MemoryWarehouse::new());
        let ctx = RunContext::new(warehouse.clone(), RunConfig::default());
        let result = ViewRunner::new().run(&node, &ctx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            warehouse.queries(),
            vec!["CREATE OR REPLACE VIEW `my_db`.`my_schema`.`v` AS (\nSELECT 1 AS a\n)"]
        );
    }
}
