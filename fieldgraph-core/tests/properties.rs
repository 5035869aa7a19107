//! Property tests for sorting and traversal on random graphs.

use std::collections::{HashMap, HashSet, VecDeque};

use fieldgraph_core::{DependentsGraph, FieldId, SortOutcome};
use proptest::prelude::*;

fn name(index: usize) -> FieldId {
    FieldId::new(format!("f{index}"))
}

/// Node count plus arbitrary `(upstream, dependent)` index pairs.
fn edges() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..24).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..n * 3)))
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependentsGraph {
    let mut graph = DependentsGraph::new();
    for index in 0..n {
        graph.insert_node(name(index));
    }
    for &(upstream, dependent) in edges {
        graph.add_edge(&name(upstream), &name(dependent));
    }
    graph
}

/// Kahn's algorithm: whether every node can be peeled off.
fn is_acyclic(n: usize, edges: &[(usize, usize)]) -> bool {
    let unique: HashSet<(usize, usize)> = edges.iter().copied().collect();
    let mut in_degree = vec![0usize; n];
    let mut out: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(upstream, dependent) in &unique {
        in_degree[dependent] += 1;
        out.entry(upstream).or_default().push(dependent);
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut peeled = 0;
    while let Some(node) = ready.pop_front() {
        peeled += 1;
        for &next in out.get(&node).into_iter().flatten() {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }
    peeled == n
}

fn reachable(n: usize, edges: &[(usize, usize)], start: usize) -> HashSet<FieldId> {
    let mut seen = vec![false; n];
    let mut queue: VecDeque<usize> = edges
        .iter()
        .filter(|(upstream, _)| *upstream == start)
        .map(|&(_, dependent)| dependent)
        .collect();
    while let Some(node) = queue.pop_front() {
        if std::mem::replace(&mut seen[node], true) {
            continue;
        }
        queue.extend(edges.iter().filter(|(upstream, _)| *upstream == node).map(|&(_, d)| d));
    }
    (0..n).filter(|&i| seen[i]).map(name).collect()
}

proptest! {
    #[test]
    fn forward_edges_always_sort((n, raw) in edges()) {
        let forward: Vec<_> = raw.into_iter().filter(|(a, b)| a < b).collect();
        let graph = build(n, &forward);

        let SortOutcome::Sorted(order) = graph.topological_sort() else {
            panic!("acyclic graph reported a cycle");
        };
        prop_assert_eq!(order.len(), n);

        let position: HashMap<&FieldId, usize> = order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        prop_assert_eq!(position.len(), n);
        for (upstream, dependent) in forward {
            prop_assert!(position[&name(upstream)] < position[&name(dependent)]);
        }
    }

    #[test]
    fn cycles_are_reported_exactly_when_present((n, raw) in edges()) {
        let graph = build(n, &raw);

        match graph.topological_sort() {
            SortOutcome::Sorted(order) => {
                prop_assert!(is_acyclic(n, &raw));
                let position: HashMap<&FieldId, usize> =
                    order.iter().enumerate().map(|(i, id)| (id, i)).collect();
                for &(upstream, dependent) in &raw {
                    prop_assert!(position[&name(upstream)] < position[&name(dependent)]);
                }
            }
            SortOutcome::Cycle(path) => {
                prop_assert!(!is_acyclic(n, &raw));
                let fields = path.fields();
                prop_assert!(!fields.is_empty());
                for pair in fields.windows(2) {
                    prop_assert!(graph.has_edge(&pair[0], &pair[1]));
                }
                prop_assert!(graph.has_edge(&fields[fields.len() - 1], &fields[0]));
            }
        }
    }

    #[test]
    fn descendants_match_reachability((n, raw) in edges(), start in 0usize..24) {
        let start = start % n;
        let graph = build(n, &raw);

        let found: HashSet<FieldId> = graph.all_descendants(&name(start)).into_iter().collect();
        prop_assert_eq!(found, reachable(n, &raw, start));

        let direct: HashSet<FieldId> = graph.direct_descendants(&name(start)).into_iter().collect();
        let expected: HashSet<FieldId> = raw
            .iter()
            .filter(|(upstream, _)| *upstream == start)
            .map(|&(_, dependent)| name(dependent))
            .collect();
        prop_assert_eq!(direct, expected);
    }

    #[test]
    fn affected_fields_are_closed_under_dependents((n, raw) in edges(), changed in prop::collection::vec(0usize..24, 0..4)) {
        let graph = build(n, &raw);
        let changed: Vec<FieldId> = changed.into_iter().map(|i| name(i % n)).collect();

        let affected = graph.affected_by(&changed);
        for field_id in &changed {
            prop_assert!(affected.contains(field_id));
        }
        for field_id in &affected {
            for dependent in graph.direct_descendants(field_id) {
                prop_assert!(affected.contains(&dependent));
            }
        }
    }
}
