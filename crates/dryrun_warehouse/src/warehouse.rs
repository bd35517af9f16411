//! Warehouse trait and query outcomes.
//!
//! A warehouse answers two questions for the dry run: what schema a query
//! would produce, and what schema an existing relation has. Rejections of a
//! query are data (they fail a single node); transport problems are errors
//! (they abort the run).

use async_trait::async_trait;
use dryrun_core::{Table, TableRef};
use std::sync::Arc;

/// Classification of a rejected dry run query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// Query is invalid (syntax, type or reference error)
    BadRequest,
    /// Caller lacks access to a referenced object
    Forbidden,
    /// A referenced object does not exist
    NotFound,
    /// Query is valid but its output schema uses types we cannot model
    UnknownSchema,
}

impl RejectionKind {
    /// Short name used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BadRequest",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::UnknownSchema => "UnknownSchema",
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query the warehouse refused to plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Classification
    pub kind: RejectionKind,
    /// Message returned by the warehouse
    pub message: String,
}

impl Rejection {
    /// Create a rejection
    #[must_use]
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a dry run query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Query planned; this is its output schema
    Success(Table),
    /// Query refused
    Rejected(Rejection),
}

impl QueryOutcome {
    /// Shorthand for a rejection
    #[must_use]
    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(kind, message))
    }

    /// Whether the query planned
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Errors talking to the warehouse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WarehouseError {
    /// The warehouse did not answer in time
    #[error("Warehouse request timed out: {message}")]
    Timeout {
        /// Underlying message
        message: String,
    },

    /// Timeouts persisted across every attempt
    #[error("Warehouse request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last error message
        message: String,
    },

    /// Network or unexpected HTTP failure
    #[error("Warehouse transport error: {message}")]
    Transport {
        /// Underlying message
        message: String,
    },

    /// Credentials refused
    #[error("Warehouse authentication failed: {message}")]
    Auth {
        /// Underlying message
        message: String,
    },

    /// Response body could not be understood
    #[error("Could not decode warehouse response: {message}")]
    Decode {
        /// Underlying message
        message: String,
    },
}

impl WarehouseError {
    /// Whether a retry could help
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { message }
        } else if err.is_decode() {
            Self::Decode { message }
        } else {
            Self::Transport { message }
        }
    }
}

/// Result type for warehouse calls
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// A warehouse able to dry run queries and describe relations
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Dry run `sql` and report its output schema
    ///
    /// # Errors
    ///
    /// Returns error if the warehouse could not be reached or timed out
    async fn query(&self, sql: &str) -> WarehouseResult<QueryOutcome>;

    /// Schema of an existing relation, `None` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the warehouse could not be reached
    async fn get_node_schema(&self, table_ref: &TableRef) -> WarehouseResult<Option<Table>>;

    /// Whether a relation exists
    ///
    /// # Errors
    ///
    /// Returns error if the warehouse could not be reached
    async fn node_exists(&self, table_ref: &TableRef) -> WarehouseResult<bool> {
        Ok(self.get_node_schema(table_ref).await?.is_some())
    }
}

#[async_trait]
impl<W: Warehouse + ?Sized> Warehouse for Arc<W> {
    async fn query(&self, sql: &str) -> WarehouseResult<QueryOutcome> {
        (**self).query(sql).await
    }

    async fn get_node_schema(&self, table_ref: &TableRef) -> WarehouseResult<Option<Table>> {
        (**self).get_node_schema(table_ref).await
    }

    async fn node_exists(&self, table_ref: &TableRef) -> WarehouseResult<bool> {
        (**self).node_exists(table_ref).await
    }
}
