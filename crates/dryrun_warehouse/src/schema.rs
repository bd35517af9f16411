//! Decoding warehouse schema JSON into [`Table`].
//!
//! The warehouse describes schemas as `{"fields": [{"name", "type", "mode",
//! "fields", "description"}]}`. Type names outside the modelled set are a
//! schema error rather than a transport error: the query itself planned fine.

use dryrun_core::{Field, FieldMode, FieldType, Table};
use serde::Deserialize;

/// A schema field as the warehouse sends it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawField {
    /// Column name
    pub name: String,
    /// Type name, not yet validated
    #[serde(rename = "type")]
    pub field_type: String,
    /// Mode name, absent for NULLABLE
    #[serde(default)]
    pub mode: Option<String>,
    /// Nested fields
    #[serde(default)]
    pub fields: Option<Vec<RawField>>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

/// A schema as the warehouse sends it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawSchema {
    /// Top-level fields
    #[serde(default)]
    pub fields: Vec<RawField>,
}

/// A field type (or mode) the schema model does not cover
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "BigQuery dry run field '{field}' returned unknown column types: '{type_name}' is not a valid field type"
)]
pub struct UnknownSchemaError {
    /// Offending column
    pub field: String,
    /// Type name as received
    pub type_name: String,
}

fn convert_field(raw: &RawField) -> Result<Field, UnknownSchemaError> {
    let unknown = |type_name: &str| UnknownSchemaError {
        field: raw.name.clone(),
        type_name: type_name.to_string(),
    };
    let field_type: FieldType = raw
        .field_type
        .parse()
        .map_err(|_| unknown(&raw.field_type))?;
    let mode = match raw.mode.as_deref() {
        Some(mode) => mode.parse::<FieldMode>().map_err(|_| unknown(mode))?,
        None => FieldMode::Nullable,
    };
    let fields = match &raw.fields {
        Some(nested) if !nested.is_empty() => Some(convert_fields(nested)?),
        _ => None,
    };
    Ok(Field {
        name: raw.name.clone(),
        field_type,
        mode,
        fields,
        description: raw.description.clone(),
    })
}

fn convert_fields(raw: &[RawField]) -> Result<Vec<Field>, UnknownSchemaError> {
    raw.iter().map(convert_field).collect()
}

impl RawSchema {
    /// Convert to a table
    ///
    /// # Errors
    ///
    /// Returns error naming the first field with an unknown type
    pub fn to_table(&self) -> Result<Table, UnknownSchemaError> {
        Ok(Table::new(convert_fields(&self.fields)?))
    }
}
