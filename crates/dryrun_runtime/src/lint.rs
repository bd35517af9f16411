//! Column linting.
//!
//! Compares the columns documented in the manifest with the predicted
//! schema. Nested predicted fields are compared in dot notation.

use crate::result::{DryRunResult, LintingError};
use dryrun_core::RunConfig;
use dryrun_plan::{expand_table_fields, Node, CHECK_COLUMNS_META_KEY};
use indexmap::IndexSet;

/// Rule for predicted columns missing from the metadata
pub const UNDOCUMENTED_COLUMNS: &str = "UNDOCUMENTED_COLUMNS";

/// Rule for documented columns the prediction does not have
pub const EXTRA_DOCUMENTED_COLUMNS: &str = "EXTRA_DOCUMENTED_COLUMNS";

/// Whether linting is switched on for a node
///
/// `dry_run.check_columns` decides when present; otherwise the extra key
/// from the config does.
#[must_use]
pub fn lint_enabled(node: &Node, config: &RunConfig) -> bool {
    if let Some(value) = node.combined_metadata(CHECK_COLUMNS_META_KEY) {
        return value.as_bool().unwrap_or(false);
    }
    config
        .extra_check_columns_metadata_key
        .as_deref()
        .and_then(|key| node.combined_metadata(key))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Lint a result against its node's documented columns
#[must_use]
pub fn lint_columns(result: DryRunResult) -> DryRunResult {
    let Some(table) = &result.table else {
        return result;
    };
    let predicted = expand_table_fields(table);
    let documented: IndexSet<&str> = result.node.columns.keys().map(String::as_str).collect();

    let mut errors: Vec<LintingError> = predicted
        .iter()
        .filter(|c| !documented.contains(c.as_str()))
        .map(|c| LintingError {
            rule: UNDOCUMENTED_COLUMNS.to_string(),
            message: format!("Column not documented in metadata: '{}'", c),
        })
        .collect();

    let predicted: IndexSet<&str> = predicted.iter().map(String::as_str).collect();
    errors.extend(
        documented
            .iter()
            .filter(|c| !predicted.contains(*c))
            .map(|c| LintingError {
                rule: EXTRA_DOCUMENTED_COLUMNS.to_string(),
                message: format!("Extra column in metadata: '{}'", c),
            }),
    );
    result.with_linting_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::LintingStatus;
    use dryrun_core::{Field, FieldType, Table};
    use dryrun_plan::{ManifestColumn, NodeConfig, ResourceType};
    use indexmap::IndexMap;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn meta(pairs: &[(&str, Value)]) -> Option<IndexMap<String, Value>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn test_lint_enabled_precedence() {
        let config = RunConfig::default().with_extra_check_columns_metadata_key("lint");

        let mut node = Node::new("m", ResourceType::Model);
        assert!(!lint_enabled(&node, &config));

        node.meta = meta(&[("lint", json!(true))]);
        assert!(lint_enabled(&node, &config));
        assert!(!lint_enabled(&node, &RunConfig::default()));

        node.meta = meta(&[("lint", json!(true)), (CHECK_COLUMNS_META_KEY, json!(false))]);
        assert!(!lint_enabled(&node, &config));

        let mut node_config = NodeConfig::default();
        node_config.meta = meta(&[(CHECK_COLUMNS_META_KEY, json!(true))]);
        node = node.with_config(node_config);
        assert!(lint_enabled(&node, &config));
    }

    #[test]
    fn test_lint_columns() {
        let node = Node::new("m", ResourceType::Model).with_columns([
            ManifestColumn::new("a", None),
            ManifestColumn::new("s", None),
            ManifestColumn::new("gone", None),
        ]);
        let table = Table::new(vec![
            Field::new("a", FieldType::String),
            Field::record("s", vec![Field::new("x", FieldType::Int64)]),
        ]);
        let result = lint_columns(DryRunResult::success(Arc::new(node), table));
        assert_eq!(result.linting_status, LintingStatus::Failure);
        let messages: Vec<&str> = result.linting_errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Column not documented in metadata: 's.x'",
                "Extra column in metadata: 'gone'",
            ]
        );
        assert_eq!(result.linting_errors[0].rule, UNDOCUMENTED_COLUMNS);
    }

    #[test]
    fn test_fully_documented() {
        let node = Node::new("m", ResourceType::Model).with_columns([ManifestColumn::new("a", None)]);
        let table = Table::new(vec![Field::new("a", FieldType::String)]);
        let result = lint_columns(DryRunResult::success(Arc::new(node), table));
        assert_eq!(result.linting_status, LintingStatus::Success);
    }

    #[test]
    fn test_no_table_untouched() {
        let node = Node::new("m", ResourceType::Source);
        let result = lint_columns(DryRunResult::without_table(Arc::new(node)));
        assert_eq!(result.linting_status, LintingStatus::Skipped);
    }
}
