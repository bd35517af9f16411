//! Generation scheduler.
//!
//! Groups runnable nodes into generations with layered Kahn's algorithm:
//! generation 0 holds every node without a runnable dependency, generation
//! `k + 1` every node whose dependencies all sit in generations `<= k`.
//! Ids are sorted inside a generation so the order is reproducible.

use dryrun_plan::{Dag, PlanError, PlanResult};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;

/// Node ids that can run concurrently
pub type Generation = Vec<String>;

/// Dependency graph of runnable nodes
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    /// All nodes in insertion order
    all_nodes: IndexSet<String>,
    /// Dependencies: node -> nodes it depends on
    dependencies: IndexMap<String, IndexSet<String>>,
    /// Dependents (reverse edges): node -> nodes depending on it
    dependents: IndexMap<String, IndexSet<String>>,
}

impl Scheduler {
    /// Create an empty scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler over the runnable nodes of a graph
    #[must_use]
    pub fn from_dag(dag: &Dag) -> Self {
        let mut scheduler = Self::new();
        for id in &dag.runnable {
            scheduler.add_node(id.clone(), dag.dependencies(id).iter().cloned());
        }
        scheduler
    }

    /// Add a node with its dependencies
    ///
    /// Dependencies that are never added as nodes are ignored when the
    /// generations are computed.
    pub fn add_node(&mut self, node_id: String, deps: impl IntoIterator<Item = String>) {
        let deps: IndexSet<String> = deps.into_iter().collect();
        for dep in &deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(node_id.clone());
        }
        self.dependencies.insert(node_id.clone(), deps);
        self.all_nodes.insert(node_id);
    }

    /// Compute the generations
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` listing the nodes left once every node
    /// outside a cycle has been scheduled
    pub fn generations(&self) -> PlanResult<Vec<Generation>> {
        let mut remaining: IndexMap<&str, usize> = self
            .all_nodes
            .iter()
            .map(|id| {
                let in_degree = self
                    .dependencies
                    .get(id)
                    .map_or(0, |deps| deps.iter().filter(|d| self.all_nodes.contains(*d)).count());
                (id.as_str(), in_degree)
            })
            .collect();

        let mut generations = Vec::new();
        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        while !ready.is_empty() {
            for id in &ready {
                remaining.shift_remove(id);
            }
            let mut next = BTreeSet::new();
            for id in &ready {
                let Some(dependents) = self.dependents.get(*id) else {
                    continue;
                };
                for dependent in dependents {
                    if let Some(degree) = remaining.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(dependent.as_str());
                        }
                    }
                }
            }
            generations.push(ready.into_iter().map(str::to_string).collect());
            ready = next;
        }

        if !remaining.is_empty() {
            let mut nodes: Vec<String> = remaining.keys().map(|id| id.to_string()).collect();
            nodes.sort();
            return Err(PlanError::CycleDetected { nodes });
        }
        Ok(generations)
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.all_nodes.len()
    }

    /// Whether there is nothing to run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_nodes.is_empty()
    }

    /// All nodes
    #[must_use]
    pub fn nodes(&self) -> &IndexSet<String> {
        &self.all_nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dryrun_plan::{Manifest, Materialization, Node, NodeFilter, ResourceType};

    fn ids(generation: &[&str]) -> Generation {
        generation.iter().map(|s| s.to_string()).collect()
    }

    fn deps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scheduler_new() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_empty());
        assert!(scheduler.generations().unwrap().is_empty());
    }

    #[test]
    fn test_chain() {
        let mut scheduler = Scheduler::new();
        scheduler.add_node("c".into(), deps(&["b"]));
        scheduler.add_node("b".into(), deps(&["a"]));
        scheduler.add_node("a".into(), deps(&[]));
        assert_eq!(
            scheduler.generations().unwrap(),
            vec![ids(&["a"]), ids(&["b"]), ids(&["c"])]
        );
    }

    #[test]
    fn test_generation_sorted_and_diamond() {
        let mut scheduler = Scheduler::new();
        scheduler.add_node("root".into(), deps(&[]));
        scheduler.add_node("z".into(), deps(&["root"]));
        scheduler.add_node("y".into(), deps(&["root"]));
        scheduler.add_node("leaf".into(), deps(&["z", "y"]));
        scheduler.add_node("alone".into(), deps(&[]));
        assert_eq!(
            scheduler.generations().unwrap(),
            vec![ids(&["alone", "root"]), ids(&["y", "z"]), ids(&["leaf"])]
        );
    }

    #[test]
    fn test_unknown_dependencies_ignored() {
        let mut scheduler = Scheduler::new();
        scheduler.add_node("a".into(), deps(&["not_scheduled"]));
        assert_eq!(scheduler.generations().unwrap(), vec![ids(&["a"])]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut scheduler = Scheduler::new();
        scheduler.add_node("ok".into(), deps(&[]));
        scheduler.add_node("a".into(), deps(&["b", "ok"]));
        scheduler.add_node("b".into(), deps(&["a"]));
        let err = scheduler.generations().unwrap_err();
        assert_eq!(
            err,
            PlanError::CycleDetected {
                nodes: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_from_dag_skips_ephemeral() {
        let model = |id: &str, m: Materialization, d: &[&str]| {
            Node::new(id, ResourceType::Model)
                .with_materialized(m)
                .with_depends_on(d.iter().copied())
        };
        let manifest = Manifest::new(
            [
                model("A", Materialization::Table, &[]),
                model("C", Materialization::Ephemeral, &["A"]),
                model("B", Materialization::View, &["C"]),
            ],
            [],
        );
        let dag = Dag::build(&manifest, &NodeFilter::All).unwrap();
        let scheduler = Scheduler::from_dag(&dag);
        assert_eq!(scheduler.len(), 2);
        assert_eq!(
            scheduler.generations().unwrap(),
            vec![ids(&["A"]), ids(&["B"])]
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        /// Random DAG: node `i` may only depend on nodes `< i`
        fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
            (1usize..25).prop_flat_map(|n| {
                (0..n)
                    .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(4)))
                    .collect::<Vec<_>>()
            })
        }

        fn build(edges: &[Vec<usize>]) -> Scheduler {
            let mut scheduler = Scheduler::new();
            for (i, node_deps) in edges.iter().enumerate() {
                let node_deps: Vec<String> = node_deps
                    .iter()
                    .filter(|&&d| d < i)
                    .map(|d| format!("n{:02}", d))
                    .collect();
                scheduler.add_node(format!("n{:02}", i), node_deps);
            }
            scheduler
        }

        proptest! {
            #[test]
            fn every_node_in_exactly_one_generation(edges in dag_strategy()) {
                let scheduler = build(&edges);
                let generations = scheduler.generations().unwrap();
                let mut seen = BTreeSet::new();
                for generation in &generations {
                    for id in generation {
                        prop_assert!(seen.insert(id.clone()));
                    }
                }
                prop_assert_eq!(seen.len(), scheduler.len());
            }

            #[test]
            fn dependencies_run_in_earlier_generations(edges in dag_strategy()) {
                let scheduler = build(&edges);
                let generations = scheduler.generations().unwrap();
                let index: IndexMap<&str, usize> = generations
                    .iter()
                    .enumerate()
                    .flat_map(|(g, ids)| ids.iter().map(move |id| (id.as_str(), g)))
                    .collect();
                for (node, node_deps) in &scheduler.dependencies {
                    for dep in node_deps {
                        prop_assert!(index[dep.as_str()] < index[node.as_str()]);
                    }
                    if node_deps.is_empty() {
                        prop_assert_eq!(index[node.as_str()], 0);
                    }
                }
            }
        }
    }
}
