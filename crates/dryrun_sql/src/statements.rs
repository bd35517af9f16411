//! Statement builders used while preparing a node's dry run query.

use crate::token::tokenize;
use dryrun_core::TableRef;
use dryrun_plan::PartitionDataType;

/// Placeholder dbt uses for the current maximum partition value
pub const MAX_PARTITION_VARIABLE: &str = "_dbt_max_partition";

/// Prepend a session header (UDFs, variables) to a statement
#[must_use]
pub fn add_sql_header(sql: &str, header: Option<&str>) -> String {
    match header {
        Some(header) if !header.is_empty() => format!("{}\n{}", header, sql),
        _ => sql.to_string(),
    }
}

/// Wrap a query in `CREATE OR REPLACE VIEW`
#[must_use]
pub fn create_or_replace_view(sql: &str, table_ref: &TableRef) -> String {
    format!("CREATE OR REPLACE VIEW {} AS (\n{}\n)", table_ref, sql)
}

/// Expression a partition of the given type defaults to
#[must_use]
pub const fn partition_default_value(data_type: PartitionDataType) -> &'static str {
    match data_type {
        PartitionDataType::Timestamp => "CURRENT_TIMESTAMP()",
        PartitionDataType::Datetime => "CURRENT_DATETIME()",
        PartitionDataType::Date => "CURRENT_DATE()",
        PartitionDataType::Int64 => "100",
    }
}

/// Declare the max partition variable when the compiled code references it
///
/// `compiled_code` is checked rather than `sql` so the decision does not
/// depend on earlier rewrite steps.
#[must_use]
pub fn add_max_partition_declaration(
    sql: &str,
    compiled_code: &str,
    partition_type: Option<PartitionDataType>,
) -> String {
    match partition_type {
        Some(data_type) if compiled_code.contains(MAX_PARTITION_VARIABLE) => format!(
            "declare {} {} default {};\n{}",
            MAX_PARTITION_VARIABLE,
            data_type.as_str(),
            partition_default_value(data_type),
            sql
        ),
        _ => sql.to_string(),
    }
}

/// `MERGE` probe checking that a predicted select can be inserted into the target
///
/// Columns are inserted by name in sorted order.
#[must_use]
pub fn merge_sql<'a>(
    table_ref: &TableRef,
    common_field_names: impl IntoIterator<Item = &'a str>,
    select_statement: &str,
) -> String {
    let mut columns: Vec<&str> = common_field_names.into_iter().collect();
    columns.sort_unstable();
    columns.dedup();
    let values_csv = columns.join(",");
    format!(
        "MERGE {}\nUSING (\n  {}\n)\nON False\nWHEN NOT MATCHED THEN\nINSERT ({})\nVALUES ({})\n",
        table_ref, select_statement, values_csv, values_csv
    )
}

/// Whether the query uses `WITH RECURSIVE`
///
/// Comments and string literals are skipped; the keywords may be separated by
/// any whitespace and are matched case-insensitively.
#[must_use]
pub fn has_recursive_cte(sql: &str) -> bool {
    let mut previous_was_with = false;
    for token in tokenize(sql).iter().filter(|t| t.is_significant()) {
        if previous_was_with && token.is_keyword("recursive") {
            return true;
        }
        previous_was_with = token.is_keyword("with");
    }
    false
}
