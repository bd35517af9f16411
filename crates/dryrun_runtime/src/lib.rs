//! dryrun runtime
//!
//! Schedules the planned graph into generations, runs each node with the
//! runner for its kind against a [`dryrun_warehouse::Warehouse`], and
//! collects the predicted schemas into a shared [`Results`] store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod lint;
pub mod preprocess;
pub mod report;
pub mod result;
pub mod results;
pub mod runner;
pub mod scheduler;

// Re-exports
pub use engine::ExecutionEngine;
pub use error::{NodeError, RuntimeError, RuntimeResult};
pub use lint::{lint_columns, lint_enabled, EXTRA_DOCUMENTED_COLUMNS, UNDOCUMENTED_COLUMNS};
pub use preprocess::{substitute_upstreams, Preprocessor, Step};
pub use report::{Report, ReportNode, ResultReporter};
pub use result::{DryRunResult, DryRunStatus, LintingError, LintingStatus};
pub use results::Results;
pub use runner::{NodeRunner, RunContext, RunnerKey, Runners};
pub use scheduler::{Generation, Scheduler};
