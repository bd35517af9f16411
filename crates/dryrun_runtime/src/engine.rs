//! Execution engine.
//!
//! Runs the planned graph generation by generation. Nodes of one generation
//! run as concurrent tasks bounded by the configured thread count; the next
//! generation starts only once every task of the current one has finished,
//! so upstream results are always visible to their dependents.

use crate::error::{RuntimeError, RuntimeResult};
use crate::lint::{lint_columns, lint_enabled};
use crate::results::Results;
use crate::runner::{RunContext, Runners};
use crate::scheduler::{Generation, Scheduler};
use dryrun_core::RunConfig;
use dryrun_plan::{validate_manifest_compatibility, Dag, Manifest, Node, NodeFilter};
use dryrun_warehouse::Warehouse;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Dry runs a manifest against a warehouse
pub struct ExecutionEngine {
    warehouse: Arc<dyn Warehouse>,
    config: Arc<RunConfig>,
    runners: Arc<Runners>,
}

impl ExecutionEngine {
    /// Create a new execution engine
    #[must_use]
    pub fn new(warehouse: Arc<dyn Warehouse>, config: RunConfig) -> Self {
        Self {
            warehouse,
            config: Arc::new(config),
            runners: Arc::new(Runners::new()),
        }
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Dry run every selected node
    ///
    /// Node failures are recorded in the returned results; they never stop
    /// the run.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest can't be planned or a node hits a fault
    /// that aborts the run (warehouse unreachable, unsupported config)
    #[instrument(skip_all, fields(threads = self.config.threads))]
    pub async fn run(&self, manifest: &Manifest, filter: &NodeFilter) -> RuntimeResult<Arc<Results>> {
        validate_manifest_compatibility(manifest)?;
        let dag = Dag::build(manifest, filter)?;
        let generations = Scheduler::from_dag(&dag).generations()?;

        info!("Dry running {} nodes", dag.len());

        let results = Arc::new(Results::new());
        let ctx = RunContext::new(Arc::clone(&self.warehouse), RunConfig::clone(&self.config))
            .with_dependencies(dag.deep_dependencies)
            .with_results(Arc::clone(&results));
        let permits = Arc::new(Semaphore::new(self.config.threads.max(1)));

        for (index, generation) in generations.iter().enumerate() {
            debug!(generation = index, nodes = generation.len(), "Starting generation");
            self.run_generation(manifest, generation, &ctx, &permits).await?;
        }

        results.finish();
        info!(duration = %results.duration(), "Dry run finished");
        Ok(results)
    }

    /// Run one generation and wait for all of it
    async fn run_generation(
        &self,
        manifest: &Manifest,
        generation: &Generation,
        ctx: &RunContext,
        permits: &Arc<Semaphore>,
    ) -> RuntimeResult<()> {
        let mut tasks: Vec<(String, JoinHandle<RuntimeResult<()>>)> =
            Vec::with_capacity(generation.len());
        for node_id in generation {
            let Some(node) = manifest.get(node_id) else {
                warn!(node = %node_id, "Scheduled node missing from manifest");
                continue;
            };
            let node = Arc::clone(node);
            let ctx = ctx.clone();
            let runners = Arc::clone(&self.runners);
            let permits = Arc::clone(permits);
            let task = tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| RuntimeError::TaskFailed {
                        message: e.to_string(),
                    })?;
                run_node(&runners, &node, &ctx).await
            });
            tasks.push((node_id.clone(), task));
        }

        let mut first_error = None;
        for (node_id, task) in tasks {
            let outcome = task.await.unwrap_or_else(|e| {
                Err(RuntimeError::TaskFailed {
                    message: e.to_string(),
                })
            });
            if let Err(source) = outcome {
                warn!(node = %node_id, error = %source, "Node task failed");
                first_error.get_or_insert(RuntimeError::NodeExecution {
                    node_id,
                    source: Box::new(source),
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Dispatch, lint and record one node
async fn run_node(runners: &Runners, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<()> {
    let mut result = runners.dispatch(node, ctx).await?;
    if lint_enabled(node, &ctx.config) {
        result = lint_columns(result);
    }
    debug!(node = %node.unique_id, status = %result.status, "Node finished");
    ctx.results.add(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{DryRunStatus, LintingStatus};
    use dryrun_core::{Field, FieldType, Table};
    use dryrun_plan::{ManifestColumn, Materialization, NodeConfig, PlanError, ResourceType};
    use dryrun_warehouse::{MemoryWarehouse, QueryOutcome};
    use serde_json::json;

    fn model(id: &str, sql: &str, deps: &[&str]) -> Node {
        Node::new(id, ResourceType::Model)
            .with_materialized(Materialization::Table)
            .with_compiled_code(sql)
            .with_depends_on(deps.iter().copied())
    }

    fn engine(warehouse: MemoryWarehouse) -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(warehouse), RunConfig::default().with_threads(2))
    }

    #[tokio::test]
    async fn test_every_node_gets_a_result() {
        let manifest = Manifest::new(
            [
                model("a", "SELECT 1", &[]),
                model("b", "SELECT 2", &["a"]),
                model("c", "SELECT 3", &["a"]),
            ],
            [],
        );
        let results = engine(MemoryWarehouse::new())
            .run(&manifest, &NodeFilter::All)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.values().iter().all(|r| r.is_success()));
        // Generation 0 finishes before generation 1 starts
        assert_eq!(results.keys()[0], "a");
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let warehouse = MemoryWarehouse::new().on_query(
            "broken",
            Ok(QueryOutcome::rejected(
                dryrun_warehouse::RejectionKind::BadRequest,
                "Syntax error",
            )),
        );
        let manifest = Manifest::new(
            [
                model("a", "SELECT broken", &[]),
                model("b", "SELECT 1", &["a"]),
                model("c", "SELECT 1", &[]),
            ],
            [],
        );
        let results = engine(warehouse).run(&manifest, &NodeFilter::All).await.unwrap();
        assert_eq!(results.get("a").unwrap().status, DryRunStatus::Failure);
        assert_eq!(results.get("b").unwrap().error.unwrap().kind(), "UpstreamFailed");
        assert!(results.get("c").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_fatal_node_error_aborts() {
        let mut config = NodeConfig::materialized(Materialization::Snapshot);
        config.unique_key = Some(dryrun_plan::UniqueKey::Single("a".to_string()));
        config.strategy = Some("sometimes".to_string());
        let snapshot = Node::new("snapshot.s", ResourceType::Snapshot)
            .with_config(config)
            .with_compiled_code("SELECT 1 AS a");
        let manifest = Manifest::new([snapshot], []);
        let err = engine(MemoryWarehouse::new())
            .run(&manifest, &NodeFilter::All)
            .await
            .unwrap_err();
        match err {
            RuntimeError::NodeExecution { node_id, source } => {
                assert_eq!(node_id, "snapshot.s");
                assert!(matches!(*source, RuntimeError::UnknownSnapshotStrategy { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_sql_manifest_rejected() {
        let mut node = model("py", "", &[]);
        node.language = Some("python".to_string());
        let manifest = Manifest::new([node], []);
        let err = engine(MemoryWarehouse::new())
            .run(&manifest, &NodeFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Plan(PlanError::UnsupportedLanguage { .. })));
    }

    #[tokio::test]
    async fn test_linting_applied_when_enabled() {
        let predicted = Table::new(vec![Field::new("a", FieldType::String)]);
        let warehouse =
            MemoryWarehouse::new().with_default_response(Ok(QueryOutcome::Success(predicted)));
        let mut node = model("a", "SELECT 'x' AS a", &[]).with_columns([ManifestColumn::new("b", None)]);
        node.meta = Some([("dry_run.check_columns".to_string(), json!(true))].into_iter().collect());
        let manifest = Manifest::new([node], []);
        let results = engine(warehouse).run(&manifest, &NodeFilter::All).await.unwrap();
        let result = results.get("a").unwrap();
        assert!(result.is_success());
        assert_eq!(result.linting_status, LintingStatus::Failure);
        assert_eq!(result.linting_errors.len(), 2);
    }
}
