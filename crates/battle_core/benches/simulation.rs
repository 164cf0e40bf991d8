//! Simulation benchmarks for battle_core.
//!
//! Run with: `cargo bench -p battle_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use battle_core::events::NullObserver;
use battle_core::simulation::Simulation;
use battle_test_utils::fixtures::{massed_config, skirmish_config};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Full matches on the reference engine, scripts included.
pub fn simulation_benchmark(c: &mut Criterion) {
    c.bench_function("skirmish_full_match", |b| {
        b.iter(|| {
            let mut sim = Simulation::new(skirmish_config(7)).unwrap();
            black_box(sim.run(&mut NullObserver))
        })
    });

    let mut group = c.benchmark_group("massed_100_ticks");
    for per_side in [8u32, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(per_side), &per_side, |b, &n| {
            b.iter(|| {
                let mut sim = Simulation::new(massed_config(n, 1).with_max_ticks(100)).unwrap();
                black_box(sim.run(&mut NullObserver))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
