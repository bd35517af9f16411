//! Node runners.
//!
//! Each `(resource_type, materialization)` pair maps to one [`RunnerKey`];
//! each key has one runner. A runner first validates the node (which can
//! settle the result without touching the warehouse) and then runs it.

mod incremental;
pub mod schema_change;
mod seed;
mod snapshot;
mod source;
mod table;
mod view;

pub use data_test::TestRunner;
pub use incremental::{IncrementalRunner, PARTITION_TIME_COLUMN};
pub use seed::{infer_column_type, SeedRunner};
pub use snapshot::{snapshot_fields, SnapshotRunner};
pub use source::SourceRunner;
pub use table::TableRunner;
pub use view::ViewRunner;

use crate::error::{NodeError, RuntimeError, RuntimeResult};
use crate::preprocess::Preprocessor;
use crate::result::DryRunResult;
use crate::results::Results;
use async_trait::async_trait;
use dryrun_core::RunConfig;
use dryrun_plan::{DeepDependencies, Materialization, Node, ResourceType};
use dryrun_warehouse::Warehouse;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// Everything a runner needs besides the node
#[derive(Clone)]
pub struct RunContext {
    /// Warehouse shared by every task
    pub warehouse: Arc<dyn Warehouse>,
    /// Results of earlier generations
    pub results: Arc<Results>,
    /// Runnable dependencies per node
    pub dependencies: Arc<DeepDependencies>,
    /// Run settings
    pub config: Arc<RunConfig>,
}

impl RunContext {
    /// Context with an empty results store and no dependencies
    #[must_use]
    pub fn new(warehouse: Arc<dyn Warehouse>, config: RunConfig) -> Self {
        Self {
            warehouse,
            results: Arc::new(Results::new()),
            dependencies: Arc::new(DeepDependencies::new()),
            config: Arc::new(config),
        }
    }

    /// Replace the dependency map
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DeepDependencies) -> Self {
        self.dependencies = Arc::new(dependencies);
        self
    }

    /// Replace the results store
    #[must_use]
    pub fn with_results(mut self, results: Arc<Results>) -> Self {
        self.results = results;
        self
    }

    /// Runnable dependencies of a node
    #[must_use]
    pub fn dependencies_of(&self, node_id: &str) -> &[String] {
        self.dependencies.get(node_id).map_or(&[], Vec::as_slice)
    }
}

/// Runner selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunnerKey {
    /// `model` materialized as `view`
    View,
    /// `model` materialized as `table`
    Table,
    /// `model` materialized as `incremental`
    Incremental,
    /// `seed`
    Seed,
    /// `snapshot`
    Snapshot,
    /// `source`, any materialization
    Source,
    /// `test`
    Test,
}

impl RunnerKey {
    /// Every key
    pub const ALL: [RunnerKey; 7] = [
        Self::View,
        Self::Table,
        Self::Incremental,
        Self::Seed,
        Self::Snapshot,
        Self::Source,
        Self::Test,
    ];

    /// Key for a node
    ///
    /// # Errors
    ///
    /// Returns `UnknownRunner` for unsupported combinations
    pub fn for_node(node: &Node) -> RuntimeResult<Self> {
        let key = match (&node.resource_type, node.materialization()) {
            (ResourceType::Model, Some(Materialization::View)) => Self::View,
            (ResourceType::Model, Some(Materialization::Table)) => Self::Table,
            (ResourceType::Model, Some(Materialization::Incremental)) => Self::Incremental,
            (ResourceType::Seed, Some(Materialization::Seed)) => Self::Seed,
            (ResourceType::Snapshot, Some(Materialization::Snapshot)) => Self::Snapshot,
            (ResourceType::Test, Some(Materialization::Test)) => Self::Test,
            (ResourceType::Source, _) => Self::Source,
            (resource_type, materialized) => {
                return Err(RuntimeError::UnknownRunner {
                    resource_type: resource_type.to_string(),
                    materialized: materialized
                        .map_or_else(|| "none".to_string(), |m| m.as_str().to_string()),
                });
            }
        };
        Ok(key)
    }

    /// Short name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Table => "table",
            Self::Incremental => "incremental",
            Self::Seed => "seed",
            Self::Snapshot => "snapshot",
            Self::Source => "source",
            Self::Test => "test",
        }
    }
}

/// Predicts the schema of one kind of node
#[async_trait]
pub trait NodeRunner: Send + Sync {
    /// Whether the node needs compiled SQL
    fn requires_compilation(&self) -> bool {
        true
    }

    /// Settle the result without running the node, if possible
    fn validate(&self, node: &Arc<Node>, config: &RunConfig) -> Option<DryRunResult> {
        if !self.requires_compilation() || node.compiled {
            return None;
        }
        let error = NodeError::NotCompiled {
            node_id: node.unique_id.clone(),
        };
        Some(if config.skip_not_compiled {
            DryRunResult::skipped(Arc::clone(node), error)
        } else {
            DryRunResult::failure(Arc::clone(node), error)
        })
    }

    /// Run the node
    ///
    /// # Errors
    ///
    /// Returns error only for faults that abort the whole run
    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult>;
}

/// Preprocess and dry run the node's SQL
///
/// # Errors
///
/// Returns error if the warehouse fails
pub(crate) async fn preprocess_and_query(
    preprocessor: &Preprocessor,
    node: &Arc<Node>,
    ctx: &RunContext,
) -> RuntimeResult<DryRunResult> {
    let sql = match preprocessor.run(node, ctx) {
        Ok(sql) => sql,
        Err(err) => return Ok(DryRunResult::failure(Arc::clone(node), err)),
    };
    let outcome = ctx.warehouse.query(&sql).await?;
    Ok(DryRunResult::from_outcome(Arc::clone(node), outcome))
}

/// Lookup table from key to runner
pub struct Runners {
    runners: IndexMap<RunnerKey, Box<dyn NodeRunner>>,
}

impl Runners {
    /// One runner per key
    #[must_use]
    pub fn new() -> Self {
        let runners = RunnerKey::ALL
            .into_iter()
            .map(|key| {
                let runner: Box<dyn NodeRunner> = match key {
                    RunnerKey::View => Box::new(ViewRunner::new()),
                    RunnerKey::Table => Box::new(TableRunner::new()),
                    RunnerKey::Incremental => Box::new(IncrementalRunner::new()),
                    RunnerKey::Seed => Box::new(SeedRunner),
                    RunnerKey::Snapshot => Box::new(SnapshotRunner::new()),
                    RunnerKey::Source => Box::new(SourceRunner),
                    RunnerKey::Test => Box::new(TestRunner::new()),
                };
                (key, runner)
            })
            .collect();
        Self { runners }
    }

    /// Runner for a key
    #[must_use]
    pub fn get(&self, key: RunnerKey) -> Option<&dyn NodeRunner> {
        self.runners.get(&key).map(Box::as_ref)
    }

    /// Validate then run a node with the matching runner
    ///
    /// # Errors
    ///
    /// Returns error if no runner handles the node or the run must abort
    pub async fn dispatch(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        let key = RunnerKey::for_node(node)?;
        let runner = self.get(key).ok_or_else(|| RuntimeError::UnknownRunner {
            resource_type: node.resource_type.to_string(),
            materialized: key.as_str().to_string(),
        })?;
        if let Some(result) = runner.validate(node, &ctx.config) {
            debug!(node = %node.unique_id, status = %result.status, "Settled by validation");
            return Ok(result);
        }
        runner.run(node, ctx).await
    }
}

impl Default for Runners {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DryRunStatus;
    use dryrun_warehouse::MemoryWarehouse;

    fn ctx(config: RunConfig) -> RunContext {
        RunContext::new(Arc::new(MemoryWarehouse::new()), config)
    }

    #[test]
    fn test_runner_keys() {
        let model = |m| Node::new("m", ResourceType::Model).with_materialized(m);
        assert_eq!(
            RunnerKey::for_node(&model(Materialization::View)).unwrap(),
            RunnerKey::View
        );
        assert_eq!(
            RunnerKey::for_node(&model(Materialization::Incremental)).unwrap(),
            RunnerKey::Incremental
        );
        assert_eq!(
            RunnerKey::for_node(&Node::new("s", ResourceType::Source)).unwrap(),
            RunnerKey::Source
        );
        assert_eq!(
            RunnerKey::for_node(
                &Node::new("t", ResourceType::Test).with_materialized(Materialization::Test)
            )
            .unwrap(),
            RunnerKey::Test
        );
    }

    #[test]
    fn test_unknown_runner() {
        let node = Node::new("m", ResourceType::Model).with_materialized(Materialization::Ephemeral);
        let err = RunnerKey::for_node(&node).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::UnknownRunner {
                resource_type: "model".to_string(),
                materialized: "ephemeral".to_string(),
            }
        );
    }

    #[test]
    fn test_every_key_has_a_runner() {
        let runners = Runners::new();
        for key in RunnerKey::ALL {
            assert!(runners.get(key).is_some(), "{:?}", key);
        }
    }

    #[tokio::test]
    async fn test_not_compiled_fails() {
        let mut node = Node::new("model.a", ResourceType::Model)
            .with_materialized(Materialization::Table);
        node.compiled = false;
        let result = Runners::new()
            .dispatch(&Arc::new(node), &ctx(RunConfig::default()))
            .await
            .unwrap();
        assert_eq!(result.status, DryRunStatus::Failure);
        assert_eq!(result.error.unwrap().kind(), "NotCompiled");
    }

    #[tokio::test]
    async fn test_not_compiled_skipped_with_flag() {
        let mut node = Node::new("model.a", ResourceType::Model)
            .with_materialized(Materialization::Table);
        node.compiled = false;
        let config = RunConfig::default().with_skip_not_compiled(true);
        let result = Runners::new()
            .dispatch(&Arc::new(node), &ctx(config))
            .await
            .unwrap();
        assert_eq!(result.status, DryRunStatus::Skipped);
    }

    #[test]
    fn test_seed_never_requires_compilation() {
        let mut node = Node::new("seed.s", ResourceType::Seed).with_materialized(Materialization::Seed);
        node.compiled = false;
        let runners = Runners::new();
        let seed = runners.get(RunnerKey::Seed).unwrap();
        assert!(seed.validate(&Arc::new(node), &RunConfig::default()).is_none());
    }
}
