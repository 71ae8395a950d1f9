//! Benchmarks for scope store hit and miss paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snaptree::{MemoStore, ScopeStore, SingletonStore};

fn bench_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_hit");

    for size in [32u32, 1_024] {
        let memo: MemoStore<u64> = MemoStore::new();
        let singleton: SingletonStore<u64> = SingletonStore::new();
        for id in 0..size {
            memo.get_or_create(id, || u64::from(id)).ok();
            singleton.get_or_create(id, || u64::from(id)).ok();
        }

        group.bench_with_input(BenchmarkId::new("MemoStore", size), &size, |b, &size| {
            b.iter(|| {
                let mut sum = 0u64;
                for id in 0..size {
                    sum += memo.get_or_create(id, || 0).unwrap_or(0);
                }
                black_box(sum)
            });
        });

        group.bench_with_input(BenchmarkId::new("SingletonStore", size), &size, |b, &size| {
            b.iter(|| {
                let mut sum = 0u64;
                for id in 0..size {
                    sum += singleton.get_or_create(id, || 0).unwrap_or(0);
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_fill");

    for size in [32u32, 1_024] {
        group.bench_with_input(BenchmarkId::new("MemoStore", size), &size, |b, &size| {
            b.iter(|| {
                let store: MemoStore<u64> = MemoStore::new();
                for id in 0..size {
                    store.get_or_create(id, || u64::from(id)).ok();
                }
                store.dispose_all();
                black_box(store.is_disposed())
            });
        });

        group.bench_with_input(BenchmarkId::new("SingletonStore", size), &size, |b, &size| {
            b.iter(|| {
                let store: SingletonStore<u64> = SingletonStore::new();
                for id in 0..size {
                    store.get_or_create(id, || u64::from(id)).ok();
                }
                store.dispose_all();
                black_box(store.is_disposed())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hit, bench_fill);
criterion_main!(benches);
