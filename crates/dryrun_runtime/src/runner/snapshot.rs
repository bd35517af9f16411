//! Snapshots.

use super::{preprocess_and_query, NodeRunner, RunContext};
use crate::error::{NodeError, RuntimeError, RuntimeResult};
use crate::preprocess::Preprocessor;
use crate::result::DryRunResult;
use async_trait::async_trait;
use dryrun_core::{Field, FieldType, Table};
use dryrun_plan::{CheckCols, HardDeletes, Node, NodeConfig, UniqueKey};
use std::sync::Arc;
use tracing::instrument;

/// Bookkeeping columns dbt adds to every snapshot
///
/// `dbt_is_deleted` only exists when deletions are recorded as new rows.
#[must_use]
pub fn snapshot_fields(config: &NodeConfig) -> Vec<Field> {
    let mut fields = vec![
        Field::new("dbt_scd_id", FieldType::String),
        Field::new("dbt_updated_at", FieldType::Timestamp),
        Field::new("dbt_valid_from", FieldType::Timestamp),
        Field::new("dbt_valid_to", FieldType::Timestamp),
    ];
    if config.hard_deletes == Some(HardDeletes::NewRecord) {
        fields.push(Field::new("dbt_is_deleted", FieldType::String));
    }
    fields
}

/// Dry runs the snapshot SELECT and checks its config against the result
#[derive(Debug, Clone)]
pub struct SnapshotRunner {
    preprocessor: Preprocessor,
}

impl SnapshotRunner {
    /// Runner with substitution only
    #[must_use]
    pub fn new() -> Self {
        Self {
            preprocessor: Preprocessor::substitute_only(),
        }
    }
}

impl Default for SnapshotRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn config_error(message: String) -> NodeError {
    NodeError::SnapshotConfig { message }
}

/// Check the config against the produced table
///
/// The outer error aborts the run; the inner one fails the node.
fn validate_config(node: &Node, table: &Table) -> RuntimeResult<Result<(), NodeError>> {
    let config = &node.config;
    match &config.unique_key {
        Some(UniqueKey::Composite(keys)) => {
            return Err(RuntimeError::SnapshotUniqueKeyList {
                node_id: node.unique_id.clone(),
                keys: keys.clone(),
            });
        }
        Some(UniqueKey::Single(key)) if !table.has_field(key) => {
            return Ok(Err(config_error(format!(
                "Missing `unique_key` column '{}'",
                key
            ))));
        }
        Some(UniqueKey::Single(_)) => {}
        None => {
            return Ok(Err(config_error(
                "Snapshot has no `unique_key` configured".to_string(),
            )));
        }
    }

    match config.strategy.as_deref() {
        Some("timestamp") => {
            let updated_at = config.updated_at.as_deref().unwrap_or_default();
            if !table.has_field(updated_at) {
                return Ok(Err(config_error(format!(
                    "Missing `updated_at` column '{}'",
                    updated_at
                ))));
            }
        }
        Some("check") => {
            if let Some(CheckCols::Columns(columns)) = &config.check_cols {
                let missing: Vec<&str> = columns
                    .iter()
                    .map(String::as_str)
                    .filter(|c| !table.has_field(c))
                    .collect();
                if !missing.is_empty() {
                    return Ok(Err(config_error(format!(
                        "Missing `check_cols` '{}'",
                        missing.join(", ")
                    ))));
                }
            }
        }
        other => {
            return Err(RuntimeError::UnknownSnapshotStrategy {
                node_id: node.unique_id.clone(),
                strategy: other.unwrap_or("none").to_string(),
            });
        }
    }
    Ok(Ok(()))
}

#[async_trait]
impl NodeRunner for SnapshotRunner {
    #[instrument(skip_all, fields(node = %node.unique_id))]
    async fn run(&self, node: &Arc<Node>, ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        let result = preprocess_and_query(&self.preprocessor, node, ctx).await?;
        let Some(predicted) = result.table.as_ref().filter(|_| result.is_success()) else {
            return Ok(result);
        };
        let table = predicted.with_appended(snapshot_fields(&node.config));
        Ok(match validate_config(node, &table)? {
            Ok(()) => DryRunResult::success(Arc::clone(node), table),
            Err(err) => DryRunResult::failure_with_table(Arc::clone(node), table, err),
        })
    }
}
