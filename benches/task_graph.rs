//! Micro-benchmarks for the hot paths of dependency registration: the
//! free-list pool's allocate/recycle cycle, matching a new dependency
//! against an already-populated hash table bucket, and the copy-in
//! planner's fast (already-deduped) path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use dart_tasking::copyin::{plan_copyin, PrefetchTaskFactory};
use dart_tasking::deprecord::DepType;
use dart_tasking::ids::{GlobalPtr, Phase, SegmentId, TaskId, UnitId, TEAM_ALL};
use dart_tasking::matcher::match_local_datadep;
use dart_tasking::pool::DepRecordPool;
use dart_tasking::task::{Task, TaskRef};

const BUCKET_COUNT: usize = 1023;

fn addr(offset: u64) -> GlobalPtr {
    GlobalPtr::new(TEAM_ALL, UnitId(0), SegmentId(1), offset)
}

fn pool_allocate_recycle(c: &mut Criterion) {
    let pool = DepRecordPool::new();
    c.bench_function("pool_allocate_recycle", |b| {
        b.iter(|| {
            let record = pool.allocate();
            pool.recycle(black_box(record));
        })
    });
}

/// Matching a fresh `IN` dep against a bucket whose head is an `OUT`
/// record — the common case in a read-after-write chain. Each iteration
/// rebuilds the table so earlier iterations' entries don't pile up and
/// skew bucket-walk length.
fn match_local_datadep_raw(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_local_datadep_raw");
    for chain_len in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(chain_len), &chain_len, |b, &chain_len| {
            b.iter_batched(
                || {
                    let pool = DepRecordPool::new();
                    let root = Task::new_root(TaskId(0), UnitId(0));
                    let mut next_id = 1u64;
                    for i in 0..chain_len {
                        let writer = Task::new_child(
                            TaskId(next_id),
                            Arc::clone(&root),
                            Phase(i as u64),
                            UnitId(0),
                            Box::new(|| {}),
                        );
                        next_id += 1;
                        match_local_datadep(&root, &writer, DepType::Out, addr(8), Phase(i as u64), &pool, BUCKET_COUNT);
                    }
                    let reader = Task::new_child(
                        TaskId(next_id),
                        Arc::clone(&root),
                        Phase(chain_len as u64),
                        UnitId(0),
                        Box::new(|| {}),
                    );
                    (pool, root, reader)
                },
                |(pool, root, reader)| {
                    match_local_datadep(&root, &reader, DepType::In, addr(8), Phase(chain_len as u64), &pool, BUCKET_COUNT);
                    black_box(reader)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

struct StubFactory {
    pool: DepRecordPool,
    next_id: std::sync::atomic::AtomicU64,
}

impl PrefetchTaskFactory for StubFactory {
    fn create_prefetch_task(&self, phase: Phase, _src: GlobalPtr, dest_addr: u64) -> TaskRef {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let root = Task::new_root(TaskId(0), UnitId(0));
        let prefetch = Task::new_child(TaskId(1000 + id), root.clone(), phase, UnitId(0), Box::new(|| {}));
        let dest = GlobalPtr::new(TEAM_ALL, UnitId(0), dart_tasking::ids::LOCAL_COPYIN, dest_addr);
        match_local_datadep(&root, &prefetch, DepType::Out, dest, phase, &self.pool, BUCKET_COUNT);
        prefetch
    }
}

/// The copy-in planner's already-deduped fast path: a second (and every
/// subsequent) consumer finds the prefetch's `OUT` record on its first
/// `try_attach` call and never reaches the factory.
fn copyin_dedup_fast_path(c: &mut Criterion) {
    c.bench_function("copyin_dedup_fast_path", |b| {
        b.iter_batched(
            || {
                let pool = DepRecordPool::new();
                let root = Task::new_root(TaskId(0), UnitId(0));
                let factory = StubFactory {
                    pool: DepRecordPool::new(),
                    next_id: std::sync::atomic::AtomicU64::new(0),
                };
                let src = GlobalPtr::new(TEAM_ALL, UnitId(1), SegmentId(2), 64);
                let first = Task::new_child(TaskId(1), Arc::clone(&root), Phase(0), UnitId(0), Box::new(|| {}));
                plan_copyin(&root, &first, UnitId(0), src, 0x10, Phase(0), &pool, BUCKET_COUNT, &factory);
                let consumer = Task::new_child(TaskId(2), Arc::clone(&root), Phase(0), UnitId(0), Box::new(|| {}));
                (pool, root, factory, src, consumer)
            },
            |(pool, root, factory, src, consumer)| {
                plan_copyin(&root, &consumer, UnitId(0), src, black_box(0x10), Phase(0), &pool, BUCKET_COUNT, &factory);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, pool_allocate_recycle, match_local_datadep_raw, copyin_dedup_fast_path);
criterion_main!(benches);
