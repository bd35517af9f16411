//! Shared results store.
//!
//! The only mutable state shared between node tasks. Reads of a node id are
//! only meaningful once the generation that owns it has finished.

use crate::result::DryRunResult;
use dryrun_core::{Duration, Timestamp};
use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Results keyed by node id, in completion order
#[derive(Debug)]
pub struct Results {
    inner: Mutex<IndexMap<String, DryRunResult>>,
    started: Timestamp,
    finished: Mutex<Option<Timestamp>>,
}

impl Results {
    /// Empty store; the run clock starts now
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IndexMap::new()),
            started: Timestamp::now(),
            finished: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, DryRunResult>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a result, replacing any earlier one for the node
    pub fn add(&self, result: DryRunResult) {
        let id = result.node.unique_id.clone();
        self.lock().insert(id, result);
    }

    /// Result for a node
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<DryRunResult> {
        self.lock().get(node_id).cloned()
    }

    /// Whether a node has a result
    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.lock().contains_key(node_id)
    }

    /// Node ids with results
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Every result
    #[must_use]
    pub fn values(&self) -> Vec<DryRunResult> {
        self.lock().values().cloned().collect()
    }

    /// Number of results
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no result has been stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop the run clock
    pub fn finish(&self) {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        finished.get_or_insert_with(Timestamp::now);
    }

    /// When the run started
    #[must_use]
    pub fn started(&self) -> Timestamp {
        self.started
    }

    /// Run time, up to now when not finished
    #[must_use]
    pub fn duration(&self) -> Duration {
        let finished = *self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        finished
            .unwrap_or_else(Timestamp::now)
            .duration_since(&self.started)
    }
}

impl Default for Results {
    fn default() -> Self {
        Self::new()
    }
}
