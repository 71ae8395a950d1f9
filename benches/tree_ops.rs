//! Benchmarks for persistent tree operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snaptree::{HashTree, IntTree, SharedMap};
use std::collections::BTreeMap;
use std::sync::Arc;

fn generate_service_keys(n: usize) -> Vec<String> {
    let modules = ["core", "http", "db", "cache", "auth"];
    (0..n)
        .map(|i| format!("{}::Service{}", modules[i % modules.len()], i))
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [1_000, 10_000] {
        let keys = generate_service_keys(size);

        group.bench_with_input(BenchmarkId::new("HashTree", size), &keys, |b, keys| {
            b.iter(|| {
                let mut tree: HashTree<String, u64> = HashTree::new();
                for (i, key) in keys.iter().enumerate() {
                    tree = tree.add_or_update(key.clone(), i as u64);
                }
                black_box(tree)
            });
        });

        group.bench_with_input(BenchmarkId::new("IntTree", size), &size, |b, &size| {
            b.iter(|| {
                let mut tree: IntTree<u64> = IntTree::new();
                for i in 0..size as i32 {
                    tree = tree.add_or_update(i, i as u64);
                }
                black_box(tree)
            });
        });

        // Copy-on-write baseline: clone the whole map per insert.
        group.bench_with_input(BenchmarkId::new("Arc<BTreeMap>", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: Arc<BTreeMap<String, u64>> = Arc::default();
                for (i, key) in keys.iter().enumerate() {
                    let mut next = (*map).clone();
                    next.insert(key.clone(), i as u64);
                    map = Arc::new(next);
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [1_000, 10_000, 100_000] {
        let keys = generate_service_keys(size);
        let tree: HashTree<String, u64> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as u64))
            .collect();
        let btree: BTreeMap<String, u64> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as u64))
            .collect();

        group.bench_with_input(BenchmarkId::new("HashTree", size), &keys, |b, keys| {
            b.iter(|| {
                let mut sum = 0u64;
                for key in keys.iter() {
                    if let Some(v) = tree.get(key) {
                        sum += v;
                    }
                }
                black_box(sum)
            });
        });

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut sum = 0u64;
                for key in keys.iter() {
                    if let Some(v) = btree.get(key) {
                        sum += v;
                    }
                }
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for size in [1_000, 100_000] {
        let tree: IntTree<u64> = (0..size as i32).map(|i| (i, i as u64)).collect();
        group.bench_with_input(BenchmarkId::new("IntTree", size), &tree, |b, tree| {
            b.iter(|| black_box(tree.values().sum::<u64>()));
        });
    }

    group.finish();
}

fn bench_shared_map(c: &mut Criterion) {
    let keys = generate_service_keys(1_000);
    let map: SharedMap<String, u64> = SharedMap::new();
    for (i, key) in keys.iter().enumerate() {
        map.add_or_update(key.clone(), i as u64).ok();
    }

    c.bench_function("shared_map_get_1000", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for key in keys.iter() {
                sum += map.get(key).unwrap_or(0);
            }
            black_box(sum)
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_iterate,
    bench_shared_map
);
criterion_main!(benches);
