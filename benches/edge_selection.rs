use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use hiveflow::graph::{select_edge, EdgeCondition, EdgeSpec, NodeOutcome};

fn edge_set(fanout: usize) -> Vec<EdgeSpec> {
    (0..fanout)
        .map(|i| EdgeSpec {
            id: format!("e{i}"),
            source: format!("n{}", i % 8),
            target: "t".to_string(),
            condition: match i % 3 {
                0 => EdgeCondition::OnSuccess,
                1 => EdgeCondition::OnFailure,
                _ => EdgeCondition::Always,
            },
            priority: (i % 5) as i32,
        })
        .collect()
}

fn bench_select_edge(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_edge");
    for fanout in [8usize, 64, 512] {
        let edges = edge_set(fanout);
        group.bench_with_input(BenchmarkId::from_parameter(fanout), &edges, |b, edges| {
            b.iter(|| select_edge(std::hint::black_box(edges), "n3", NodeOutcome::Success));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_select_edge);
criterion_main!(benches);
