//! Micro-benchmark of the warm-cache `getWorkerForModel` path: a fresh
//! `PlacementCache` hit should never touch the network.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_gate::placement::{ModelKey, PlacementCache};
use model_gate::worker::{Worker, WorkerId, WorkerRegistry};
use std::time::Duration;

fn warm_cache_lookup(c: &mut Criterion) {
    let cache = PlacementCache::new();
    let workers = WorkerRegistry::new();

    for i in 0..64u16 {
        let worker = Worker::new(format!("w{i}"), 8000).with_health(true);
        workers.upsert(worker.clone());
        cache.record(&worker.id, ModelKey::new("iris", "v1"));
    }

    let target = WorkerId::new("w0", 8000);
    let model = ModelKey::new("iris", "v1");

    c.bench_function("placement_cache_contains_fresh", |b| {
        b.iter(|| {
            black_box(cache.contains_fresh(
                black_box(&target),
                black_box(&model),
                Duration::from_secs(30),
            ))
        })
    });

    c.bench_function("worker_registry_healthy_snapshot", |b| {
        b.iter(|| black_box(workers.healthy()))
    });
}

criterion_group!(benches, warm_cache_lookup);
criterion_main!(benches);
