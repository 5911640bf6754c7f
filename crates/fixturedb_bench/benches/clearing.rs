//! Table clearing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use fixturedb_bench::{scripted_factory, sqlite_factory};
use fixturedb_core::{clear_tables, ClearPolicy};
use fixturedb_testkit::{reversed_chain, table_graph_strategy};
use proptest::strategy::{Strategy, ValueTree};
use proptest::test_runner::TestRunner;

/// Worst-case declaration order against the scripted store, so only the
/// algorithm itself is measured.
fn bench_scripted_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_scripted_chain");

    for len in [4, 16, 64].iter() {
        let graph = reversed_chain(*len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &graph, |b, graph| {
            b.iter_batched(
                || scripted_factory(graph),
                |factory| {
                    let report = clear_tables(&factory, ClearPolicy::Strict).unwrap();
                    black_box(report);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Same chain against real SQLite tables with enforced foreign keys.
fn bench_sqlite_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_sqlite_chain");
    group.sample_size(20);

    for len in [4, 16].iter() {
        let graph = reversed_chain(*len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &graph, |b, graph| {
            b.iter_batched(
                || sqlite_factory(graph),
                |factory| {
                    let report = clear_tables(&factory, ClearPolicy::Strict).unwrap();
                    black_box(report);
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

/// Random acyclic graphs in random order.
fn bench_random_graphs(c: &mut Criterion) {
    let mut runner = TestRunner::deterministic();
    let graphs: Vec<_> = (0..32)
        .map(|_| {
            table_graph_strategy(12)
                .new_tree(&mut runner)
                .unwrap()
                .current()
        })
        .collect();

    c.bench_function("clear_scripted_random", |b| {
        b.iter_batched(
            || graphs.iter().map(scripted_factory).collect::<Vec<_>>(),
            |factories| {
                for factory in &factories {
                    black_box(clear_tables(factory, ClearPolicy::Lenient).unwrap());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_scripted_chain,
    bench_sqlite_chain,
    bench_random_graphs,
);

criterion_main!(benches);
