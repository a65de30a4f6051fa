//! Criterion benchmarks for the per-event hot path.
//!
//! The tap callback has microseconds to answer; the dominant case of a key
//! with no rule must stay a handful of nanoseconds.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use retap::{decide_key, EngineConfig, EngineShared, MappingRule, Modifiers};

fn shared_with_n_rules(n: u16) -> EngineShared {
    let rules: Vec<MappingRule> = (0..n)
        .map(|k| MappingRule::new(Modifiers::COMMAND, k, Modifiers::OPTION, k + 1000))
        .collect();
    EngineShared::new(&EngineConfig {
        rules,
        ..EngineConfig::default()
    })
}

fn bench_pass_through_unmonitored(c: &mut Criterion) {
    let shared = shared_with_n_rules(100);

    c.bench_function("decide_key_unmonitored", |b| {
        let index = shared.index();
        b.iter(|| decide_key(&shared.gate, &index, black_box(9999), black_box(0)));
    });
}

fn bench_rewrite_match(c: &mut Criterion) {
    let shared = shared_with_n_rules(100);
    let flags = Modifiers::COMMAND.to_event_flags();

    c.bench_function("decide_key_rewrite", |b| {
        let index = shared.index();
        b.iter(|| decide_key(&shared.gate, &index, black_box(42), black_box(flags)));
    });
}

fn bench_index_snapshot(c: &mut Criterion) {
    let shared = shared_with_n_rules(100);

    c.bench_function("index_snapshot_clone", |b| {
        b.iter(|| black_box(shared.index()));
    });
}

criterion_group!(
    benches,
    bench_pass_through_unmonitored,
    bench_rewrite_match,
    bench_index_snapshot
);
criterion_main!(benches);
