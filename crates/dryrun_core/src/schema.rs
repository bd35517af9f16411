//! Warehouse table schemas.
//!
//! A [`Table`] is an ordered list of top-level [`Field`]s. Composite fields
//! (STRUCT/RECORD) carry their nested fields; every other type carries none.
//! Tables are immutable values: operations that change a schema build a new
//! table.

use crate::error::{CoreError, CoreResult};
use indexmap::IndexSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Column type as reported by the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    /// Variable-length character data
    String,
    /// Variable-length binary data
    Bytes,
    /// 64-bit integer (legacy name)
    Integer,
    /// 64-bit integer
    Int64,
    /// Double precision float (legacy name)
    Float,
    /// Double precision float
    Float64,
    /// Boolean (legacy name)
    Boolean,
    /// Boolean
    Bool,
    /// Absolute point in time
    Timestamp,
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// Civil date and time
    Datetime,
    /// Duration
    Interval,
    /// Point, line or polygon
    Geography,
    /// Exact decimal
    Numeric,
    /// Exact decimal with larger precision
    BigNumeric,
    /// Composite type
    Struct,
    /// Composite type (legacy name)
    Record,
    /// JSON document
    Json,
    /// Contiguous range of dates or timestamps
    Range,
}

impl FieldType {
    /// Every supported type, in declaration order
    pub const ALL: [FieldType; 20] = [
        Self::String,
        Self::Bytes,
        Self::Integer,
        Self::Int64,
        Self::Float,
        Self::Float64,
        Self::Boolean,
        Self::Bool,
        Self::Timestamp,
        Self::Date,
        Self::Time,
        Self::Datetime,
        Self::Interval,
        Self::Geography,
        Self::Numeric,
        Self::BigNumeric,
        Self::Struct,
        Self::Record,
        Self::Json,
        Self::Range,
    ];

    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::Integer => "INTEGER",
            Self::Int64 => "INT64",
            Self::Float => "FLOAT",
            Self::Float64 => "FLOAT64",
            Self::Boolean => "BOOLEAN",
            Self::Bool => "BOOL",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Datetime => "DATETIME",
            Self::Interval => "INTERVAL",
            Self::Geography => "GEOGRAPHY",
            Self::Numeric => "NUMERIC",
            Self::BigNumeric => "BIGNUMERIC",
            Self::Struct => "STRUCT",
            Self::Record => "RECORD",
            Self::Json => "JSON",
            Self::Range => "RANGE",
        }
    }

    /// Whether the type carries nested fields
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Struct | Self::Record)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|t| t.as_str() == upper)
            .copied()
            .ok_or(CoreError::UnknownFieldType {
                name: s.to_string(),
            })
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Cardinality of a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// Zero or one value
    #[default]
    Nullable,
    /// Exactly one value
    Required,
    /// An array of values
    Repeated,
}

impl FieldMode {
    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nullable => "NULLABLE",
            Self::Required => "REQUIRED",
            Self::Repeated => "REPEATED",
        }
    }
}

impl FromStr for FieldMode {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NULLABLE" => Ok(Self::Nullable),
            "REQUIRED" => Ok(Self::Required),
            "REPEATED" => Ok(Self::Repeated),
            _ => Err(CoreError::UnknownFieldMode {
                name: s.to_string(),
            }),
        }
    }
}

/// A column in a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Cardinality
    #[serde(default)]
    pub mode: FieldMode,
    /// Nested fields for STRUCT/RECORD columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
    /// Column description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Create a nullable scalar field
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            fields: None,
            description: None,
        }
    }

    /// Create a nullable STRUCT field with nested fields
    #[must_use]
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Struct,
            mode: FieldMode::Nullable,
            fields: Some(fields),
            description: None,
        }
    }

    /// Set the mode
    #[must_use]
    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the field is an array
    #[must_use]
    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }

    /// Check that nested fields only appear on composite types
    ///
    /// # Errors
    ///
    /// Returns error if a scalar field carries nested fields
    pub fn validate(&self) -> CoreResult<()> {
        match (&self.fields, self.field_type.is_composite()) {
            (Some(_), false) => Err(CoreError::UnexpectedNestedFields {
                field: self.name.clone(),
                field_type: self.field_type.to_string(),
            }),
            (Some(nested), true) => nested.iter().try_for_each(Field::validate),
            (None, _) => Ok(()),
        }
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        let path = format!("{}{}", prefix, self.name);
        if let Some(nested) = &self.fields {
            let nested_prefix = format!("{}.", path);
            out.push(path);
            for field in nested {
                field.collect_paths(&nested_prefix, out);
            }
        } else {
            out.push(path);
        }
    }
}

/// An ordered table schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Top-level fields in output order
    pub fields: Vec<Field>,
}

impl Table {
    /// Create a table from fields
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a new table with the given fields, leaving this one untouched
    #[must_use]
    pub fn with_fields(&self, fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a new table with `extra` appended after the existing fields
    #[must_use]
    pub fn with_appended(&self, extra: impl IntoIterator<Item = Field>) -> Self {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        Self { fields }
    }

    /// Top-level field names in order
    #[must_use]
    pub fn field_names(&self) -> IndexSet<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Whether a top-level field exists
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Top-level names present in both tables, sorted
    #[must_use]
    pub fn common_field_names(&self, other: &Table) -> BTreeSet<String> {
        let theirs = other.field_names();
        self.fields
            .iter()
            .filter(|f| theirs.contains(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    /// All field paths in dot notation, parents before children
    ///
    /// `a STRUCT<a1 STRING>` expands to `["a", "a.a1"]`.
    #[must_use]
    pub fn dotted_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for field in &self.fields {
            field.collect_paths("", &mut out);
        }
        out
    }

    /// Check the schema invariants
    ///
    /// # Errors
    ///
    /// Returns error if a scalar carries nested fields or a dotted path repeats
    pub fn validate(&self) -> CoreResult<()> {
        self.fields.iter().try_for_each(Field::validate)?;
        let mut seen = IndexSet::new();
        for path in self.dotted_paths() {
            if !seen.insert(path.clone()) {
                return Err(CoreError::DuplicateFieldPath { path });
            }
        }
        Ok(())
    }

    /// Number of top-level fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the table has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parse_case_insensitive() {
        assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::String);
        assert_eq!("BIGNUMERIC".parse::<FieldType>().unwrap(), FieldType::BigNumeric);
        assert!("BLOB".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_deserialize_defaults_mode() {
        let field: Field = serde_json::from_str(r#"{"name": "a", "type": "INTEGER"}"#).unwrap();
        assert_eq!(field.mode, FieldMode::Nullable);
        assert!(field.fields.is_none());
    }

    #[test]
    fn test_field_deserialize_nested() {
        let json = r#"{"name": "a", "type": "RECORD", "mode": "REPEATED",
                       "fields": [{"name": "b", "type": "STRING"}]}"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert!(field.is_repeated());
        assert_eq!(field.fields.as_ref().unwrap()[0].name, "b");
    }

    #[test]
    fn test_field_deserialize_unknown_type() {
        let result = serde_json::from_str::<Field>(r#"{"name": "a", "type": "WAT"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_nested_scalar() {
        let mut field = Field::new("a", FieldType::String);
        field.fields = Some(vec![Field::new("b", FieldType::String)]);
        assert!(Table::new(vec![field]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_paths() {
        let table = Table::new(vec![
            Field::new("a", FieldType::String),
            Field::new("a", FieldType::Integer),
        ]);
        assert!(matches!(
            table.validate(),
            Err(CoreError::DuplicateFieldPath { .. })
        ));
    }

    #[test]
    fn test_dotted_paths() {
        let table = Table::new(vec![
            Field::record("a", vec![Field::new("a1", FieldType::String)]),
            Field::new("b", FieldType::Integer),
        ]);
        assert_eq!(table.dotted_paths(), vec!["a", "a.a1", "b"]);
    }

    #[test]
    fn test_common_field_names() {
        let left = Table::new(vec![
            Field::new("b", FieldType::String),
            Field::new("a", FieldType::String),
        ]);
        let right = Table::new(vec![
            Field::new("a", FieldType::String),
            Field::new("c", FieldType::String),
            Field::new("b", FieldType::String),
        ]);
        let common: Vec<_> = left.common_field_names(&right).into_iter().collect();
        assert_eq!(common, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_with_appended_does_not_mutate() {
        let table = Table::new(vec![Field::new("a", FieldType::String)]);
        let extended = table.with_appended([Field::new("b", FieldType::Date)]);
        assert_eq!(table.len(), 1);
        assert_eq!(extended.len(), 2);
    }
}
