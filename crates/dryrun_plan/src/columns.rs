//! Declared columns to table schema.
//!
//! Column names use dots for nested struct members (`a`, `a.b`, `a.b.c`) and
//! a `[]` suffix on the type for arrays (`STRING[]`).

use dryrun_core::{Field, FieldMode, FieldType, Table};
use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::manifest::ManifestColumn;

const REPEATED_SUFFIX: &str = "[]";
const STRUCT_SEPARATOR: char = '.';

/// Declared columns that can't be turned into a schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    /// Columns missing or nested columns without their root
    #[error("{0}")]
    InvalidColumnSpecification(String),

    /// Missing or unparseable `data_type`
    #[error("{0}")]
    UnknownDataType(String),
}

/// Build a table from declared columns
///
/// Top-level fields come out sorted by name.
///
/// # Errors
///
/// Returns error if there are no columns, a nested column has no root
/// column, or a type is missing or unknown
pub fn map_columns_to_table(columns: &IndexMap<String, ManifestColumn>) -> Result<Table, ColumnError> {
    let by_name: BTreeMap<&str, &ManifestColumn> =
        columns.iter().map(|(name, col)| (name.as_str(), col)).collect();
    Ok(Table::new(to_fields(&by_name)?))
}

/// Build a table from a list of columns (external `dry_run_columns`)
///
/// # Errors
///
/// Same as [`map_columns_to_table`]
pub fn map_column_list_to_table(columns: &[ManifestColumn]) -> Result<Table, ColumnError> {
    let by_name: BTreeMap<&str, &ManifestColumn> =
        columns.iter().map(|col| (col.name.as_str(), col)).collect();
    Ok(Table::new(to_fields(&by_name)?))
}

fn to_fields(columns: &BTreeMap<&str, &ManifestColumn>) -> Result<Vec<Field>, ColumnError> {
    if columns.is_empty() {
        return Err(ColumnError::InvalidColumnSpecification(
            "Schema not specified in `columns` attribute in metadata".to_string(),
        ));
    }

    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in columns.keys().copied() {
        let root = name.split(STRUCT_SEPARATOR).next().unwrap_or(name);
        groups.entry(root).or_default().push(name);
    }

    let mut fields = Vec::with_capacity(groups.len());
    for (root, members) in groups {
        let Some(column) = columns.get(root) else {
            return Err(ColumnError::InvalidColumnSpecification(format!(
                "Could not find root record '{}' for struct fields in metadata '{:?}'",
                root, members
            )));
        };
        let Some(data_type) = column.data_type.as_deref() else {
            return Err(ColumnError::UnknownDataType(format!(
                "Can't determine schema of column '{}' without 'data_type' in metadata",
                root
            )));
        };

        let prefix_len = root.len() + STRUCT_SEPARATOR.len_utf8();
        let nested: BTreeMap<&str, &ManifestColumn> = members
            .iter()
            .copied()
            .filter(|name| *name != root)
            .filter_map(|name| columns.get(name).map(|col| (&name[prefix_len..], *col)))
            .collect();

        let (field_type, mode) = split_data_type(data_type)?;
        let mut field = Field::new(root, field_type).with_mode(mode);
        if !nested.is_empty() {
            field.fields = Some(to_fields(&nested)?);
        }
        fields.push(field);
    }
    Ok(fields)
}

fn split_data_type(data_type: &str) -> Result<(FieldType, FieldMode), ColumnError> {
    let (clean, mode) = match data_type.strip_suffix(REPEATED_SUFFIX) {
        Some(inner) => (inner, FieldMode::Repeated),
        None => (data_type, FieldMode::Nullable),
    };
    let field_type = clean.parse().map_err(|_| {
        ColumnError::UnknownDataType(format!(
            "Could not parse data_type `{}` from manifest",
            clean
        ))
    })?;
    Ok((field_type, mode))
}

/// Every field path of a table in dot notation
///
/// Mirrors how nested columns are written in metadata, so the result can be
/// compared against declared column names.
#[must_use]
pub fn expand_table_fields(table: &Table) -> Vec<String> {
    table.dotted_paths()
}
