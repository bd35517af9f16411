//! `on_schema_change` policies.
//!
//! Each policy turns the predicted table of a successful incremental dry run
//! into the table the model would actually have once merged into its existing
//! target. Only top-level column names are compared; type drift is kept as
//! the target has it.

use crate::error::NodeError;
use crate::result::DryRunResult;
use dryrun_core::{Field, Table};
use dryrun_plan::OnSchemaChange;
use std::collections::BTreeSet;

/// Apply a policy to a result
///
/// Results without a table pass through unchanged.
#[must_use]
pub fn apply(policy: OnSchemaChange, result: DryRunResult, target: &Table) -> DryRunResult {
    let Some(predicted) = &result.table else {
        return result;
    };
    match policy {
        OnSchemaChange::Ignore => result.replace_table(target.clone()),
        OnSchemaChange::AppendNewColumns => {
            let table = target.with_appended(new_columns(predicted, target));
            result.replace_table(table)
        }
        OnSchemaChange::SyncAllColumns => {
            let predicted_names = predicted.field_names();
            let kept = target
                .fields
                .iter()
                .filter(|f| predicted_names.contains(f.name.as_str()))
                .cloned();
            let fields: Vec<Field> = kept.chain(new_columns(predicted, target)).collect();
            result.replace_table(Table::new(fields))
        }
        OnSchemaChange::Fail => match schema_change(predicted, target) {
            Some(error) => DryRunResult::failure(result.node, error),
            None => result.replace_table(target.clone()),
        },
    }
}

/// Predicted fields the target does not have, in predicted order
fn new_columns(predicted: &Table, target: &Table) -> Vec<Field> {
    let existing = target.field_names();
    predicted
        .fields
        .iter()
        .filter(|f| !existing.contains(f.name.as_str()))
        .cloned()
        .collect()
}

/// `SchemaChange` error when the column sets differ
fn schema_change(predicted: &Table, target: &Table) -> Option<NodeError> {
    let predicted_names: BTreeSet<&str> = predicted.field_names().into_iter().collect();
    let target_names: BTreeSet<&str> = target.field_names().into_iter().collect();
    let added: Vec<String> = predicted_names
        .difference(&target_names)
        .map(|s| s.to_string())
        .collect();
    let removed: Vec<String> = target_names
        .difference(&predicted_names)
        .map(|s| s.to_string())
        .collect();
    if added.is_empty() && removed.is_empty() {
        return None;
    }
    Some(NodeError::SchemaChange { added, removed })
}
