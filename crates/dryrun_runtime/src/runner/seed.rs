//! Seeds.
//!
//! Seeds never reach the warehouse: their schema comes from the CSV file
//! itself. Column types are either configured in `column_types` or inferred
//! from the values.

use super::{NodeRunner, RunContext};
use crate::error::{NodeError, RuntimeResult};
use crate::result::DryRunResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use dryrun_core::{Field, FieldType, Table};
use dryrun_plan::Node;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d+$").unwrap());
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").unwrap());

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// What a single cell looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Timestamp,
    Text,
}

fn classify(value: &str) -> CellKind {
    if INTEGER.is_match(value) {
        CellKind::Integer
    } else if NUMBER.is_match(value) {
        CellKind::Number
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        CellKind::Boolean
    } else if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        CellKind::Date
    } else if DATETIME_FORMATS
        .iter()
        .any(|f| NaiveDateTime::parse_from_str(value, f).is_ok())
    {
        CellKind::Datetime
    } else if DateTime::parse_from_rfc3339(value).is_ok()
        || TIMESTAMP_FORMATS
            .iter()
            .any(|f| DateTime::parse_from_str(value, f).is_ok())
    {
        CellKind::Timestamp
    } else {
        CellKind::Text
    }
}

/// Infer a column type from its values
///
/// Empty cells are ignored; a column with no values is a STRING. Plain dates
/// mixed with datetimes or timestamps widen to the wider type.
#[must_use]
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> FieldType {
    let kinds: Vec<CellKind> = values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(classify)
        .collect();
    if kinds.is_empty() {
        return FieldType::String;
    }
    let all = |accepted: &[CellKind]| kinds.iter().all(|k| accepted.contains(k));
    if all(&[CellKind::Integer]) {
        FieldType::Integer
    } else if all(&[CellKind::Integer, CellKind::Number]) {
        FieldType::Float
    } else if all(&[CellKind::Boolean]) {
        FieldType::Boolean
    } else if all(&[CellKind::Date]) {
        FieldType::Date
    } else if all(&[CellKind::Date, CellKind::Datetime]) {
        FieldType::Datetime
    } else if all(&[CellKind::Date, CellKind::Datetime, CellKind::Timestamp]) {
        FieldType::Timestamp
    } else {
        FieldType::String
    }
}

/// Builds the schema of a seed from its CSV file
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedRunner;

impl SeedRunner {
    fn schema(node: &Node, content: &str) -> Result<Table, NodeError> {
        let path = node.file_path().display().to_string();
        let read_error = |err: csv::Error| NodeError::SeedRead {
            path: path.clone(),
            reason: err.to_string(),
        };
        let delimiter = node
            .config
            .delimiter
            .as_deref()
            .and_then(|d| d.bytes().next())
            .unwrap_or(b',');
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(read_error)?
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;

        let mut fields = Vec::with_capacity(headers.len());
        for (index, name) in headers.iter().enumerate() {
            let field_type = match node.config.column_types.get(name) {
                Some(configured) => {
                    configured
                        .parse::<FieldType>()
                        .map_err(|_| NodeError::UnknownSchema {
                            message: format!(
                                "Unknown Big Query schema for seed '{}' Column '{}'",
                                node.unique_id, name
                            ),
                        })?
                }
                None => infer_column_type(rows.iter().filter_map(|row| row.get(index))),
            };
            fields.push(Field::new(name.as_str(), field_type));
        }
        Ok(Table::new(fields))
    }
}

#[async_trait]
impl NodeRunner for SeedRunner {
    fn requires_compilation(&self) -> bool {
        false
    }

    #[instrument(skip_all, fields(node = %node.unique_id))]
    async fn run(&self, node: &Arc<Node>, _ctx: &RunContext) -> RuntimeResult<DryRunResult> {
        let path = node.file_path();
        debug!(path = %path.display(), "Reading seed");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) => {
                return Ok(DryRunResult::failure(
                    Arc::clone(node),
                    NodeError::SeedRead {
                        path: path.display().to_string(),
                        reason: err.to_string(),
                    },
                ));
            }
        };
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        Ok(match Self::schema(node, content) {
            Ok(table) => DryRunResult::success(Arc::clone(node), table),
            Err(err) => DryRunResult::failure(Arc::clone(node), err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DryRunStatus;
    use dryrun_core::RunConfig;
    use dryrun_plan::{Materialization, NodeConfig, ResourceType};
    use dryrun_warehouse::MemoryWarehouse;
    use std::io::Write;
    use tempfile::TempDir;

    fn seed(dir: &TempDir, contents: &str, config: NodeConfig) -> Arc<Node> {
        let mut file = std::fs::File::create(dir.path().join("s.csv")).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let mut node = Node::new("seed.s", ResourceType::Seed).with_config(config);
        node.root_path = Some(dir.path().display().to_string());
        node.original_file_path = "s.csv".to_string();
        Arc::new(node)
    }

    async fn run(node: &Arc<Node>) -> DryRunResult {
        let ctx = RunContext::new(Arc::new(MemoryWarehouse::new()), RunConfig::default());
        SeedRunner.run(node, &ctx).await.unwrap()
    }

    fn types(result: &DryRunResult) -> Vec<(String, FieldType)> {
        result
            .table
            .as_ref()
            .unwrap()
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type))
            .collect()
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type(["1", "-2", ""]), FieldType::Integer);
        assert_eq!(infer_column_type(["1", "2.5"]), FieldType::Float);
        assert_eq!(infer_column_type(["true", "False"]), FieldType::Boolean);
        assert_eq!(infer_column_type(["2021-01-01", ""]), FieldType::Date);
        assert_eq!(infer_column_type(["2021-01-01 10:00:00"]), FieldType::Datetime);
        assert_eq!(
            infer_column_type(["2021-01-01T10:00:00Z", "2021-01-01 10:00:00"]),
            FieldType::Timestamp
        );
        assert_eq!(
            infer_column_type(["2021-01-01", "2021-01-02 10:00:00"]),
            FieldType::Datetime
        );
        assert_eq!(
            infer_column_type(["2021-01-01", "2021-01-01T10:00:00Z"]),
            FieldType::Timestamp
        );
        assert_eq!(infer_column_type(["1", "abc"]), FieldType::String);
        assert_eq!(infer_column_type(["", " "]), FieldType::String);
    }

    #[tokio::test]
    async fn test_infers_schema_from_csv() {
        let dir = TempDir::new().unwrap();
        let node = seed(
            &dir,
            "\u{feff}id,price,day,flag,name\n1,1.5,2021-01-01,true,a\n2,,2021-01-02,false,b\n",
            NodeConfig::materialized(Materialization::Seed),
        );
        let result = run(&node).await;
        assert!(result.is_success());
        assert_eq!(
            types(&result),
            vec![
                ("id".to_string(), FieldType::Integer),
                ("price".to_string(), FieldType::Float),
                ("day".to_string(), FieldType::Date),
                ("flag".to_string(), FieldType::Boolean),
                ("name".to_string(), FieldType::String),
            ]
        );
    }

    #[tokio::test]
    async fn test_column_type_override_and_delimiter() {
        let dir = TempDir::new().unwrap();
        let mut config = NodeConfig::materialized(Materialization::Seed);
        config.delimiter = Some("|".to_string());
        config.column_types.insert("id".to_string(), "string".to_string());
        let node = seed(&dir, "id|n\n1|2\n", config);
        let result = run(&node).await;
        assert_eq!(
            types(&result),
            vec![
                ("id".to_string(), FieldType::String),
                ("n".to_string(), FieldType::Integer),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_override_fails() {
        let dir = TempDir::new().unwrap();
        let mut config = NodeConfig::materialized(Materialization::Seed);
        config.column_types.insert("id".to_string(), "VARCHAR".to_string());
        let node = seed(&dir, "id\n1\n", config);
        let result = run(&node).await;
        assert_eq!(result.status, DryRunStatus::Failure);
        assert_eq!(
            result.error.unwrap().to_string(),
            "Unknown Big Query schema for seed 'seed.s' Column 'id'"
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut node = Node::new("seed.gone", ResourceType::Seed);
        node.root_path = Some(dir.path().display().to_string());
        node.original_file_path = "gone.csv".to_string();
        let result = run(&Arc::new(node)).await;
        assert_eq!(result.status, DryRunStatus::Failure);
        assert_eq!(result.error.unwrap().kind(), "SeedRead");
    }
}
