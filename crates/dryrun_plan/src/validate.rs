//! Manifest compatibility checks run before scheduling.

use crate::error::{PlanError, PlanResult};
use crate::manifest::Manifest;

/// Language every dry-runnable node must be written in
pub const SUPPORTED_LANGUAGE: &str = "sql";

/// Refuse manifests containing nodes in other languages
///
/// Nodes without a language are assumed to be SQL. Every offending node is
/// listed, not just the first.
///
/// # Errors
///
/// Returns [`PlanError::UnsupportedLanguage`] naming all offending nodes
pub fn validate_manifest_compatibility(manifest: &Manifest) -> PlanResult<()> {
    let failing: Vec<String> = manifest
        .nodes
        .values()
        .filter(|node| {
            node.language
                .as_deref()
                .is_some_and(|lang| lang != SUPPORTED_LANGUAGE)
        })
        .map(|node| node.unique_id.clone())
        .collect();

    if failing.is_empty() {
        Ok(())
    } else {
        Err(PlanError::UnsupportedLanguage { nodes: failing })
    }
}
