use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fieldgraph_core::{DependentsGraph, FieldId};

/// Layers of `width` fields, each reading from up to three fields of the
/// previous layer.
fn layered(layers: usize, width: usize) -> DependentsGraph {
    let id = |layer: usize, slot: usize| FieldId::new(format!("f{layer}_{slot}"));

    let mut graph = DependentsGraph::new();
    for layer in 0..layers {
        for slot in 0..width {
            graph.insert_node(id(layer, slot));
        }
    }
    for layer in 1..layers {
        for slot in 0..width {
            for offset in 0..3 {
                graph.add_edge(&id(layer - 1, (slot + offset * 7) % width), &id(layer, slot));
            }
        }
    }
    graph
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_sort");
    for &(layers, width) in &[(10_usize, 100_usize), (50, 200), (1_000, 5)] {
        let graph = layered(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{layers}x{width}")),
            &graph,
            |b, graph| b.iter(|| black_box(graph.topological_sort())),
        );
    }
    group.finish();
}

fn bench_descendants(c: &mut Criterion) {
    let graph = layered(50, 200);
    let root = FieldId::from("f0_0");
    c.bench_function("all_descendants/50x200", |b| {
        b.iter(|| black_box(graph.all_descendants(&root)))
    });
}

criterion_group!(benches, bench_sort, bench_descendants);
criterion_main!(benches);
