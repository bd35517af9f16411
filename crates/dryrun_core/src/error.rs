//! Core error types for dryrun.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A warehouse type name that is not part of the schema model
    #[error("Unknown field type: {name}")]
    UnknownFieldType {
        /// Type name as received
        name: String,
    },

    /// A field mode that is not NULLABLE, REQUIRED or REPEATED
    #[error("Unknown field mode: {name}")]
    UnknownFieldMode {
        /// Mode name as received
        name: String,
    },

    /// Nested fields attached to a scalar type
    #[error("Field '{field}' of type {field_type} cannot carry nested fields")]
    UnexpectedNestedFields {
        /// Field name
        field: String,
        /// Field type
        field_type: String,
    },

    /// Duplicate dotted path inside one table
    #[error("Duplicate field path in table: {path}")]
    DuplicateFieldPath {
        /// Dotted field path
        path: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field or setting
        field: String,
        /// Human readable reason
        reason: String,
    },

    /// Encoding error
    #[error("Encoding error: {message}")]
    Encoding {
        /// Underlying message
        message: String,
    },
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            message: err.to_string(),
        }
    }
}
