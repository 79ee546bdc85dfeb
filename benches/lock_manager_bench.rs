//! Lock manager throughput and contention benchmarks.
//!
//! Shaped after the teacher's `transaction_bench.rs`: one group per
//! concern, `BenchmarkId::from_parameter` to sweep a size axis, black-box
//! everything that could otherwise be constant-folded away.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lock_manager::{BasicLocker, LockManager, LockManagerConfig, Locker};

type L = Arc<dyn Locker<u64>>;

fn manager(num_shards: usize) -> Arc<LockManager<u64>> {
    LockManager::new(
        LockManagerConfig::default()
            .with_num_shards(num_shards)
            .with_default_timeout(Duration::from_secs(5)),
    )
}

fn bench_uncontended_lock_unlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_lock_unlock");
    for num_shards in [1, 16, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_shards),
            &num_shards,
            |b, &num_shards| {
                let mgr = manager(num_shards);
                let locker: L = BasicLocker::new(&mgr);
                let mut key = 0u64;
                b.iter(|| {
                    key = key.wrapping_add(1);
                    mgr.lock(&locker, black_box(key), true).unwrap();
                    mgr.release_lock(&locker, key).unwrap();
                });
            },
        );
    }
    group.finish();
}

fn bench_reader_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("reader_fan_out");
    for num_readers in [1, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_readers),
            &num_readers,
            |b, &num_readers| {
                let mgr = manager(64);
                let lockers: Vec<L> = (0..num_readers).map(|_| -> L { BasicLocker::new(&mgr) }).collect();
                b.iter(|| {
                    for locker in &lockers {
                        mgr.lock(locker, black_box(1u64), false).unwrap();
                    }
                    for locker in &lockers {
                        mgr.release_lock(locker, 1u64).unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_shard_count_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_count_scaling");
    for num_shards in [1, 8, 64, 512] {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_shards),
            &num_shards,
            |b, &num_shards| {
                let mgr = manager(num_shards);
                let locker: L = BasicLocker::new(&mgr);
                b.iter(|| {
                    for key in 0..256u64 {
                        mgr.lock(&locker, black_box(key), true).unwrap();
                        mgr.release_lock(&locker, key).unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended_lock_unlock,
    bench_reader_fan_out,
    bench_shard_count_scaling
);
criterion_main!(benches);
