//! Reference engine against the native kernel.
//!
//! Run with: `cargo bench -p battle_native`

#![allow(missing_docs)]

use battle_core::backend::{BattleBackend, ReferenceBackend};
use battle_core::events::NullObserver;
use battle_native::NativeBackend;
use battle_test_utils::fixtures::massed_config;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

pub fn backend_benchmark(c: &mut Criterion) {
    let native = match NativeBackend::load() {
        Ok(native) => native,
        Err(err) => {
            eprintln!("skipping backend comparison: {err}");
            return;
        }
    };

    let mut group = c.benchmark_group("massed_match");
    for per_side in [8u32, 32, 128] {
        let config = massed_config(per_side, 11).with_max_ticks(100);
        group.bench_with_input(BenchmarkId::new("reference", per_side), &config, |b, config| {
            b.iter(|| black_box(ReferenceBackend.run_simulation(config, &mut NullObserver)))
        });
        group.bench_with_input(BenchmarkId::new("native", per_side), &config, |b, config| {
            b.iter(|| black_box(native.run_simulation(config, &mut NullObserver)))
        });
    }
    group.finish();
}

criterion_group!(benches, backend_benchmark);
criterion_main!(benches);
