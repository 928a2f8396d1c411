// packages/engine/benches/guard_bench.rs
//! Hot paths every recharge and every actor goes through.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use liveroom_sim_engine::runtime::WorkerPool;
use liveroom_sim_engine::IdempotencyGuard;
use std::time::Duration;

fn bench_guard(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _enter = runtime.enter();

    let mut group = c.benchmark_group("idempotency_guard");

    group.bench_function("try_acquire_fresh", |b| {
        let guard = IdempotencyGuard::new(Duration::from_secs(3_600));
        let mut seq = 0u64;
        b.iter(|| {
            seq += 1;
            black_box(guard.acquire(&format!("task:bot:{}", seq)))
        });
    });

    group.bench_function("try_acquire_duplicate", |b| {
        let guard = IdempotencyGuard::new(Duration::from_secs(3_600));
        guard.acquire("task:bot:1");
        b.iter(|| black_box(guard.acquire("task:bot:1")));
    });

    group.finish();
}

fn bench_pool_submit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("worker_pool");

    for size in [4usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("submit_1000", size), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let pool = WorkerPool::new(size).unwrap();
                let mut handles = Vec::with_capacity(1_000);
                for i in 0..1_000u64 {
                    handles.push(pool.submit(async move { black_box(i) }).await.unwrap());
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_guard, bench_pool_submit);
criterion_main!(benches);
