//! Run-level configuration.
//!
//! Built once at startup and shared read-only by the engine, scheduler and
//! runners.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Which literal values stand in for upstream tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralMode {
    /// Random uuids for string-like columns
    #[default]
    Random,
    /// Fixed values so generated SQL can be asserted on
    Stable,
}

/// Immutable configuration for a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker pool size per generation
    pub threads: usize,
    /// Mark uncompiled nodes SKIPPED instead of FAILURE
    pub skip_not_compiled: bool,
    /// Treat incremental models as full refresh unless the node overrides it
    pub full_refresh: bool,
    /// Metadata key that enables column linting when `dry_run.check_columns` is absent
    pub extra_check_columns_metadata_key: Option<String>,
    /// Literal values used during substitution
    pub literal_mode: LiteralMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            skip_not_compiled: false,
            full_refresh: false,
            extra_check_columns_metadata_key: None,
            literal_mode: LiteralMode::Random,
        }
    }
}

impl RunConfig {
    /// Set the worker pool size
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Skip nodes that were not compiled
    #[must_use]
    pub fn with_skip_not_compiled(mut self, skip: bool) -> Self {
        self.skip_not_compiled = skip;
        self
    }

    /// Set the run-wide full refresh flag
    #[must_use]
    pub fn with_full_refresh(mut self, full_refresh: bool) -> Self {
        self.full_refresh = full_refresh;
        self
    }

    /// Set the extra linting metadata key
    #[must_use]
    pub fn with_extra_check_columns_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.extra_check_columns_metadata_key = Some(key.into());
        self
    }

    /// Set the literal mode
    #[must_use]
    pub fn with_literal_mode(mut self, mode: LiteralMode) -> Self {
        self.literal_mode = mode;
        self
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns error if the worker pool would be empty
    pub fn validate(&self) -> CoreResult<()> {
        if self.threads == 0 {
            return Err(CoreError::Validation {
                field: "threads".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.threads, 8);
        assert!(!config.skip_not_compiled);
        assert!(!config.full_refresh);
        assert_eq!(config.literal_mode, LiteralMode::Random);
    }

    #[test]
    fn test_builder() {
        let config = RunConfig::default()
            .with_threads(2)
            .with_full_refresh(true)
            .with_extra_check_columns_metadata_key("lint")
            .with_literal_mode(LiteralMode::Stable);
        assert_eq!(config.threads, 2);
        assert!(config.full_refresh);
        assert_eq!(config.extra_check_columns_metadata_key.as_deref(), Some("lint"));
        assert_eq!(config.literal_mode, LiteralMode::Stable);
    }

    #[test]
    fn test_zero_threads_invalid() {
        assert!(RunConfig::default().with_threads(0).validate().is_err());
        assert!(RunConfig::default().validate().is_ok());
    }
}
