//! Cycle Detection and Topological Sort
//!
//! Produces a recompute order in which every field comes before the fields
//! that depend on it, or a cycle proving no such order exists.
//!
//! # Algorithm
//!
//! Depth-first traversal over the dependents graph:
//!
//! 1. Every node is tried as a root, in graph order, so disconnected parts
//!    of the graph are covered and each node is visited exactly once.
//! 2. Entering a node marks it visited and pushes it onto the current path.
//! 3. Each dependent is explored in turn. A dependent that is already on the
//!    current path closes a cycle; the cycle is the path from that dependent
//!    to the top of the stack, reported as-is.
//! 4. When all dependents of a node are done, the node leaves the path and
//!    is appended to the post-order. The reversed post-order puts every
//!    upstream before its dependents.
//!
//! The traversal keeps its own frame stack instead of recursing, so deep
//! dependency chains cannot overflow the call stack.

use std::collections::HashSet;
use std::fmt;

use super::{DependentsGraph, DependentSet};
use crate::ids::FieldId;

/// A circular dependency: each field is depended on by the next, and the
/// last is depended on by the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath(Vec<FieldId>);

impl CyclePath {
    /// Field ids on the cycle, in traversal order.
    pub fn fields(&self) -> &[FieldId] {
        &self.0
    }

    /// Take ownership of the field ids.
    pub fn into_fields(self) -> Vec<FieldId> {
        self.0
    }

    /// Number of fields on the cycle.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a detected cycle; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

/// Result of sorting a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOutcome {
    /// Every node, upstream before downstream.
    Sorted(Vec<FieldId>),
    /// The first cycle found. No order exists.
    Cycle(CyclePath),
}

impl SortOutcome {
    /// Whether a cycle was found.
    pub fn has_cycle(&self) -> bool {
        matches!(self, SortOutcome::Cycle(_))
    }
}

/// One in-progress node of the depth-first traversal.
struct Frame<'g> {
    node: &'g FieldId,
    next_dependent: usize,
}

impl DependentsGraph {
    /// Sort all nodes topologically, or report a cycle.
    pub fn topological_sort(&self) -> SortOutcome {
        let empty = DependentSet::new();
        let mut visited: HashSet<&FieldId> = HashSet::with_capacity(self.node_count());
        let mut on_path: HashSet<&FieldId> = HashSet::new();
        let mut frames: Vec<Frame<'_>> = Vec::new();
        let mut post_order: Vec<FieldId> = Vec::with_capacity(self.node_count());

        for root in self.node_ids() {
            if !visited.insert(root) {
                continue;
            }
            on_path.insert(root);
            frames.push(Frame { node: root, next_dependent: 0 });

            while let Some(frame) = frames.last_mut() {
                let dependents = self.dependents(frame.node).unwrap_or(&empty);

                let Some(next) = dependents.get_index(frame.next_dependent) else {
                    // All dependents done: the node is complete.
                    on_path.remove(frame.node);
                    post_order.push(frame.node.clone());
                    frames.pop();
                    continue;
                };
                frame.next_dependent += 1;

                if on_path.contains(next) {
                    let start = frames
                        .iter()
                        .position(|f| f.node == next)
                        .unwrap_or_default();
                    let path = frames[start..].iter().map(|f| f.node.clone()).collect();
                    return SortOutcome::Cycle(CyclePath(path));
                }

                if visited.insert(next) {
                    on_path.insert(next);
                    frames.push(Frame { node: next, next_dependent: 0 });
                }
            }
        }

        post_order.reverse();
        SortOutcome::Sorted(post_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> FieldId {
        FieldId::from(raw)
    }

    fn graph(edges: &[(&str, &[&str])]) -> DependentsGraph {
        DependentsGraph::from_entries(
            edges
                .iter()
                .map(|(node, deps)| (id(node), deps.iter().map(|d| id(d)).collect::<Vec<_>>())),
        )
    }

    fn sorted(outcome: SortOutcome) -> Vec<String> {
        match outcome {
            SortOutcome::Sorted(order) => order.into_iter().map(|f| f.to_string()).collect(),
            SortOutcome::Cycle(path) => panic!("unexpected cycle {path}"),
        }
    }

    fn position(order: &[String], raw: &str) -> usize {
        order.iter().position(|f| f == raw).unwrap()
    }

    #[test]
    fn formula_after_its_input() {
        let g = graph(&[("B", &["A"]), ("A", &[])]);
        assert_eq!(sorted(g.topological_sort()), vec!["B", "A"]);
    }

    #[test]
    fn dependents_listed_before_their_upstream_still_sort_correctly() {
        let g = graph(&[("A", &[]), ("B", &["A"])]);
        assert_eq!(sorted(g.topological_sort()), vec!["B", "A"]);
    }

    #[test]
    fn diamond_respects_every_edge() {
        let g = graph(&[
            ("top", &["left", "right"]),
            ("left", &["bottom"]),
            ("right", &["bottom"]),
            ("bottom", &[]),
        ]);
        let order = sorted(g.topological_sort());

        assert_eq!(order.len(), 4);
        assert!(position(&order, "top") < position(&order, "left"));
        assert!(position(&order, "top") < position(&order, "right"));
        assert!(position(&order, "left") < position(&order, "bottom"));
        assert!(position(&order, "right") < position(&order, "bottom"));
    }

    #[test]
    fn disconnected_components_are_all_included() {
        let g = graph(&[("a", &["b"]), ("b", &[]), ("x", &[]), ("y", &["x"])]);
        let order = sorted(g.topological_sort());

        assert_eq!(order.len(), 4);
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "y") < position(&order, "x"));
    }

    #[test]
    fn two_node_cycle() {
        let g = graph(&[("A", &["B"]), ("B", &["A"])]);
        match g.topological_sort() {
            SortOutcome::Cycle(path) => {
                assert_eq!(path.fields(), &[id("A"), id("B")]);
                assert_eq!(path.to_string(), "A -> B");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_path_starts_at_the_revisited_node() {
        // entry -> a -> b -> c -> a
        let g = graph(&[("entry", &["a"]), ("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        match g.topological_sort() {
            SortOutcome::Cycle(path) => assert_eq!(path.fields(), &[id("a"), id("b"), id("c")]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        match g.topological_sort() {
            SortOutcome::Cycle(path) => assert_eq!(path.fields(), &[id("a")]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn dangling_dependents_are_sorted_without_panicking() {
        // "ghost" is not a node but appears as a dependent.
        let g = graph(&[("a", &["ghost"])]);
        let order = sorted(g.topological_sort());
        assert_eq!(order, vec!["a", "ghost"]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let n = 50_000;
        let ids: Vec<FieldId> = (0..n).map(|i| FieldId::new(format!("f{i}"))).collect();
        let g = DependentsGraph::from_entries(
            ids.iter()
                .enumerate()
                .map(|(i, f)| (f.clone(), ids.get(i + 1).cloned().into_iter().collect::<Vec<_>>())),
        );

        match g.topological_sort() {
            SortOutcome::Sorted(order) => assert_eq!(order, ids),
            SortOutcome::Cycle(path) => panic!("unexpected cycle of {}", path.len()),
        }
    }

    #[test]
    fn empty_graph_sorts_to_nothing() {
        assert_eq!(DependentsGraph::new().topological_sort(), SortOutcome::Sorted(Vec::new()));
    }
}
