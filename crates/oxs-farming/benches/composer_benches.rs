//! Criterion benchmarks for farming reward composition.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use oxs_core::constants::{ONE_OXS, SECONDS_PER_WEEK};
use oxs_farming::composer::{apply_multipliers, base_reward, compose_multipliers, dynamic_fee};

fn bench_multipliers(c: &mut Criterion) {
    c.bench_function("compose_multipliers", |b| {
        b.iter(|| compose_multipliers(black_box(3), black_box(true), black_box(40), black_box(3_000)))
    });
}

fn bench_reward(c: &mut Criterion) {
    let m = compose_multipliers(2, true, 30, 3_000);
    c.bench_function("period_reward", |b| {
        b.iter(|| {
            let base = base_reward(black_box(250_000 * ONE_OXS), black_box(1_200), black_box(7 * 86_400))?;
            apply_multipliers(base, &m)
        })
    });
}

fn bench_fee(c: &mut Criterion) {
    c.bench_function("dynamic_fee", |b| {
        b.iter(|| dynamic_fee(black_box(500), black_box(50), black_box(52), black_box(17 * SECONDS_PER_WEEK)))
    });
}

criterion_group!(benches, bench_multipliers, bench_reward, bench_fee);
criterion_main!(benches);
