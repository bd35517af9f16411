//! Runnable dependency graph.
//!
//! Builds the graph of nodes that can be dry run. Nodes that can't
//! (ephemeral models, plain sources, disabled nodes) are folded away: a
//! dependency on one of them is replaced by its nearest runnable ancestors.

use crate::error::{PlanError, PlanResult};
use crate::manifest::{Manifest, Materialization, Node, ResourceType};
use indexmap::{IndexMap, IndexSet};

/// Runnable dependencies per node id
pub type DeepDependencies = IndexMap<String, Vec<String>>;

/// Which part of the manifest to dry run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeFilter {
    /// Every runnable node
    #[default]
    All,
    /// One node plus everything upstream of it
    Model(String),
    /// Nodes carrying any of the tags, plus everything upstream of them
    Tags(Vec<String>),
}

/// Whether a node produces a schema that can be predicted
#[must_use]
pub fn is_runnable(node: &Node) -> bool {
    if !node.config.enabled {
        return false;
    }
    if node.is_external_source() {
        return true;
    }
    let resource_ok = matches!(
        node.resource_type,
        ResourceType::Model | ResourceType::Seed | ResourceType::Snapshot | ResourceType::Test
    );
    let materialization_ok = matches!(
        node.materialization(),
        Some(
            Materialization::View
                | Materialization::Table
                | Materialization::Incremental
                | Materialization::Seed
                | Materialization::Snapshot
                | Materialization::Test
        )
    );
    resource_ok && materialization_ok
}

/// Graph of runnable nodes keyed by unique id
#[derive(Debug, Clone, Default)]
pub struct Dag {
    /// Runnable node ids in manifest order
    pub runnable: IndexSet<String>,
    /// Runnable dependencies for each runnable node
    pub deep_dependencies: DeepDependencies,
}

impl Dag {
    /// Build the runnable graph for a manifest
    ///
    /// # Errors
    ///
    /// Returns error if the filter matches nothing runnable or non-runnable
    /// nodes form a cycle
    pub fn build(manifest: &Manifest, filter: &NodeFilter) -> PlanResult<Self> {
        let mut runnable: IndexSet<String> = manifest
            .all_nodes()
            .filter(|(_, node)| is_runnable(node))
            .map(|(id, _)| id.clone())
            .collect();

        match filter {
            NodeFilter::All => {}
            NodeFilter::Model(model) => {
                let node = manifest.get(model).ok_or_else(|| PlanError::ModelNotFound {
                    model: model.clone(),
                    alternatives: runnable.iter().cloned().collect(),
                })?;
                if !runnable.contains(model) {
                    return Err(PlanError::ModelNotRunnable {
                        model: model.clone(),
                        resource_type: node.resource_type.to_string(),
                        materialized: node
                            .materialization()
                            .map_or_else(|| "none".to_string(), ToString::to_string),
                    });
                }
                let upstream = upstream_closure(manifest, [model.clone()]);
                runnable.retain(|id| upstream.contains(id));
            }
            NodeFilter::Tags(tags) => {
                let roots: Vec<String> = runnable
                    .iter()
                    .filter(|id| {
                        manifest
                            .get(id)
                            .is_some_and(|n| n.all_tags().any(|t| tags.iter().any(|w| w == t)))
                    })
                    .cloned()
                    .collect();
                if roots.is_empty() {
                    return Err(PlanError::NoNodesForTags { tags: tags.clone() });
                }
                let upstream = upstream_closure(manifest, roots);
                runnable.retain(|id| upstream.contains(id));
            }
        }

        let mut deep_dependencies = DeepDependencies::new();
        for id in &runnable {
            if let Some(node) = manifest.get(id) {
                let mut visiting = IndexSet::new();
                let deps = runnable_dependencies(manifest, node, &mut visiting)?;
                deep_dependencies.insert(id.clone(), deps);
            }
        }

        Ok(Self {
            runnable,
            deep_dependencies,
        })
    }

    /// Runnable dependencies of a node, empty when unknown
    #[must_use]
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.deep_dependencies.get(id).map_or(&[], Vec::as_slice)
    }

    /// Number of runnable nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.runnable.len()
    }

    /// Whether nothing is runnable
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty()
    }
}

/// Ids of the roots and every node transitively upstream of them
fn upstream_closure(manifest: &Manifest, roots: impl IntoIterator<Item = String>) -> IndexSet<String> {
    let mut seen = IndexSet::new();
    let mut stack: Vec<String> = roots.into_iter().collect();
    while let Some(current) = stack.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(node) = manifest.get(&current) {
            stack.extend(node.depends_on.nodes.iter().cloned());
        }
    }
    seen
}

/// Expand a node's direct dependencies through non-runnable nodes.
///
/// `visiting` holds the chain of non-runnable nodes currently being expanded
/// so a cycle among them is reported instead of recursing forever.
fn runnable_dependencies(
    manifest: &Manifest,
    node: &Node,
    visiting: &mut IndexSet<String>,
) -> PlanResult<Vec<String>> {
    let mut deps: IndexSet<String> = IndexSet::new();
    for upstream_id in &node.depends_on.nodes {
        let Some(upstream) = manifest.get(upstream_id) else {
            continue;
        };
        if is_runnable(upstream) {
            deps.insert(upstream.unique_id.clone());
            continue;
        }
        if !visiting.insert(upstream.unique_id.clone()) {
            return Err(PlanError::CycleDetected {
                nodes: visiting.iter().cloned().collect(),
            });
        }
        deps.extend(runnable_dependencies(manifest, upstream, visiting)?);
        visiting.shift_remove(&upstream.unique_id);
    }
    Ok(deps.into_iter().collect())
}
