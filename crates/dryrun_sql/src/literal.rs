//! Literal subqueries standing in for upstream tables.
//!
//! A predicted schema becomes `(SELECT <v1> as `f1`,<v2> as `f2`)` where each
//! value is an example literal of the field's type. The subquery has the
//! same output schema as the table it replaces.

use dryrun_core::{Field, FieldType, LiteralMode, Table};
use uuid::Uuid;

/// Example literal for a scalar type
#[must_use]
pub fn example_value(field_type: FieldType, mode: LiteralMode) -> String {
    match field_type {
        FieldType::String => match mode {
            LiteralMode::Random => format!("'{}'", Uuid::new_v4()),
            LiteralMode::Stable => "'foo'".to_string(),
        },
        FieldType::Bytes => match mode {
            LiteralMode::Random => format!("b'{}'", Uuid::new_v4()),
            LiteralMode::Stable => "b'foo'".to_string(),
        },
        FieldType::Integer | FieldType::Int64 => "1".to_string(),
        FieldType::Float | FieldType::Float64 => "1.0".to_string(),
        FieldType::Boolean | FieldType::Bool => "true".to_string(),
        FieldType::Timestamp => "TIMESTAMP('2021-01-01')".to_string(),
        FieldType::Date => "DATE('2021-01-01')".to_string(),
        FieldType::Time => "TIME(12,0,0)".to_string(),
        FieldType::Datetime => "DATETIME(2021,1,1,12,0,0)".to_string(),
        FieldType::Geography => "ST_GeogPoint(0.0, 0.0)".to_string(),
        FieldType::Interval => "MAKE_INTERVAL(1)".to_string(),
        FieldType::Numeric => "CAST(1 AS NUMERIC)".to_string(),
        FieldType::BigNumeric => "CAST(2 AS BIGNUMERIC)".to_string(),
        FieldType::Json => "PARSE_JSON('{\"a\": 1}')".to_string(),
        FieldType::Range => "RANGE(DATE '2022-12-01', DATE '2022-12-31')".to_string(),
        FieldType::Struct | FieldType::Record => "STRUCT()".to_string(),
    }
}

/// `<value> as `name`` for one field, recursing into structs
#[must_use]
pub fn field_to_literal(field: &Field, mode: LiteralMode) -> String {
    let value = match &field.fields {
        Some(nested) if field.field_type.is_composite() && !nested.is_empty() => {
            let members: Vec<String> = nested.iter().map(|f| field_to_literal(f, mode)).collect();
            format!("STRUCT({})", members.join(","))
        }
        _ => example_value(field.field_type, mode),
    };
    let value = if field.is_repeated() {
        format!("[{}]", value)
    } else {
        value
    };
    format!("{} as `{}`", value, field.name)
}

/// Scalar subquery with the same schema as `table`
#[must_use]
pub fn table_to_literal(table: &Table, mode: LiteralMode) -> String {
    let fields: Vec<String> = table
        .fields
        .iter()
        .map(|f| field_to_literal(f, mode))
        .collect();
    format!("(SELECT {})", fields.join(","))
}
