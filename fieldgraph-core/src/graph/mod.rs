//! Dependents Graph
//!
//! This module implements the per-base graph that tracks which fields must
//! recompute when another field changes.
//!
//! # Overview
//!
//! The graph is a directed graph where:
//!
//! - Nodes are field ids. Every field of the base is a node, even when
//!   nothing depends on it.
//! - Edges point downstream: if A reads from B, there is an edge from B to A,
//!   and A is stored in B's dependent set.
//!
//! When a field changes we walk its dependents to find everything affected
//! and use a topological order of the whole graph to sequence the
//! recomputation.
//!
//! # Design Decisions
//!
//! 1. Only the dependents direction is stored. It is the direction every
//!    query walks, and it is the shape persisted in the cache (one hash field
//!    per node holding its dependent ids).
//!
//! 2. Nodes and dependent sets are insertion ordered (`indexmap`), so
//!    traversals and the resulting topological order are deterministic for
//!    a given build or cache payload.
//!
//! 3. Edges only attach to nodes that exist. An upstream id that is not a
//!    node (a dangling reference in a field definition) is ignored.

mod toposort;
mod traversal;

pub use toposort::{CyclePath, SortOutcome};

use indexmap::{IndexMap, IndexSet};

use crate::ids::FieldId;

/// Set of immediate dependents of one field.
pub type DependentSet = IndexSet<FieldId>;

/// Mapping from field id to the fields that depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentsGraph {
    nodes: IndexMap<FieldId, DependentSet>,
}

impl DependentsGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(field, dependents)` pairs, keeping their order.
    pub fn from_entries<I, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (FieldId, D)>,
        D: IntoIterator<Item = FieldId>,
    {
        let nodes = entries
            .into_iter()
            .map(|(id, dependents)| (id, dependents.into_iter().collect()))
            .collect();
        Self { nodes }
    }

    /// Add a node with no dependents. Existing nodes are left untouched.
    ///
    /// Returns `true` if the node was new.
    pub fn insert_node(&mut self, field_id: FieldId) -> bool {
        if self.nodes.contains_key(&field_id) {
            return false;
        }
        self.nodes.insert(field_id, DependentSet::new());
        true
    }

    /// Whether `field_id` is a node.
    pub fn contains(&self, field_id: &FieldId) -> bool {
        self.nodes.contains_key(field_id)
    }

    /// Record that `dependent` reads from `upstream`.
    ///
    /// Returns `false` (and changes nothing) when `upstream` is not a node.
    pub fn add_edge(&mut self, upstream: &FieldId, dependent: &FieldId) -> bool {
        match self.nodes.get_mut(upstream) {
            Some(dependents) => {
                dependents.insert(dependent.clone());
                true
            }
            None => false,
        }
    }

    /// Whether the edge `upstream -> dependent` exists.
    pub fn has_edge(&self, upstream: &FieldId, dependent: &FieldId) -> bool {
        self.nodes
            .get(upstream)
            .is_some_and(|dependents| dependents.contains(dependent))
    }

    /// Remove `field_id` from every node's dependent set.
    ///
    /// The node itself, if any, stays in the graph.
    pub fn remove_dependent(&mut self, field_id: &FieldId) {
        for dependents in self.nodes.values_mut() {
            dependents.shift_remove(field_id);
        }
    }

    /// Remove a node and every edge pointing at it.
    ///
    /// Returns the removed node's dependents.
    pub fn remove_node(&mut self, field_id: &FieldId) -> Option<DependentSet> {
        self.remove_dependent(field_id);
        self.nodes.shift_remove(field_id)
    }

    /// Immediate dependents of `field_id`.
    pub fn dependents(&self, field_id: &FieldId) -> Option<&DependentSet> {
        self.nodes.get(field_id)
    }

    /// Node ids in graph order.
    pub fn node_ids(&self) -> impl Iterator<Item = &FieldId> + '_ {
        self.nodes.keys()
    }

    /// `(node, dependents)` pairs in graph order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &DependentSet)> + '_ {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(IndexSet::len).sum()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> FieldId {
        FieldId::from(raw)
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut graph = DependentsGraph::new();

        assert!(graph.insert_node(id("a")));
        assert!(graph.insert_node(id("b")));
        assert!(!graph.insert_node(id("a")));
        assert_eq!(graph.node_count(), 2);

        graph.remove_node(&id("a"));
        assert_eq!(graph.node_count(), 1);
        assert!(!graph.contains(&id("a")));
        assert!(graph.contains(&id("b")));
    }

    #[test]
    fn add_and_remove_edges() {
        let mut graph = DependentsGraph::new();
        graph.insert_node(id("source"));
        graph.insert_node(id("derived"));

        assert!(graph.add_edge(&id("source"), &id("derived")));
        assert!(graph.has_edge(&id("source"), &id("derived")));
        assert!(!graph.has_edge(&id("derived"), &id("source")));

        graph.remove_dependent(&id("derived"));
        assert!(!graph.has_edge(&id("source"), &id("derived")));
        // The node survives losing its incoming edges.
        assert!(graph.contains(&id("derived")));
    }

    #[test]
    fn edges_only_attach_to_existing_nodes() {
        let mut graph = DependentsGraph::new();
        graph.insert_node(id("a"));

        assert!(!graph.add_edge(&id("missing"), &id("a")));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn inserting_existing_node_keeps_its_dependents() {
        let mut graph = DependentsGraph::from_entries([(id("a"), vec![id("b")]), (id("b"), vec![])]);

        graph.insert_node(id("a"));
        assert!(graph.has_edge(&id("a"), &id("b")));
    }

    #[test]
    fn removing_a_node_drops_incoming_edges() {
        let mut graph = DependentsGraph::from_entries([
            (id("a"), vec![id("b"), id("c")]),
            (id("b"), vec![id("c")]),
            (id("c"), vec![]),
        ]);

        let removed = graph.remove_node(&id("c"));
        assert_eq!(removed, Some(DependentSet::new()));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge(&id("a"), &id("b")));
    }

    #[test]
    fn from_entries_preserves_order() {
        let graph = DependentsGraph::from_entries(["z", "a", "m"].map(|raw| (id(raw), Vec::<FieldId>::new())));
        let order: Vec<_> = graph.node_ids().map(FieldId::as_str).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
    }
}
