/*!
 * Lock Benchmarks
 *
 * Compare the lock family under no contention and under a small herd
 * of threads hammering one shared counter.
 */

use corral::backoff::{CompositeBackoff, ExponentialBackoff, NoBackoff};
use corral::lock::{FutexLock, RawLock, SpinLock, SysLock, TicketLock, TtasLock};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn uncontended<L: RawLock>(rounds: u64) -> u64 {
    let lock = L::default();
    let mut acc = 0u64;
    for i in 0..rounds {
        lock.lock();
        acc = acc.wrapping_add(i);
        unsafe { lock.unlock() };
    }
    acc
}

fn contended<L: RawLock + 'static>(threads: usize, rounds: u64) -> u64 {
    let lock = Arc::new(L::default());
    let counter = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = lock.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..rounds {
                    lock.lock_with(CompositeBackoff::new(
                        ExponentialBackoff::new(64),
                        NoBackoff,
                    ));
                    let v = counter.load(Ordering::Relaxed);
                    counter.store(v + 1, Ordering::Relaxed);
                    unsafe { lock.unlock() };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    counter.load(Ordering::Relaxed)
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_uncontended");
    group.bench_function("spin", |b| b.iter(|| uncontended::<SpinLock>(black_box(1_000))));
    group.bench_function("ttas", |b| b.iter(|| uncontended::<TtasLock>(black_box(1_000))));
    group.bench_function("ticket", |b| {
        b.iter(|| uncontended::<TicketLock>(black_box(1_000)))
    });
    group.bench_function("futex", |b| {
        b.iter(|| uncontended::<FutexLock>(black_box(1_000)))
    });
    group.bench_function("sys", |b| b.iter(|| uncontended::<SysLock>(black_box(1_000))));
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_contended");
    group.sample_size(10);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("ttas", threads), &threads, |b, &t| {
            b.iter(|| contended::<TtasLock>(t, 2_000))
        });
        group.bench_with_input(BenchmarkId::new("ticket", threads), &threads, |b, &t| {
            b.iter(|| contended::<TicketLock>(t, 2_000))
        });
        group.bench_with_input(BenchmarkId::new("futex", threads), &threads, |b, &t| {
            b.iter(|| contended::<FutexLock>(t, 2_000))
        });
        group.bench_with_input(BenchmarkId::new("sys", threads), &threads, |b, &t| {
            b.iter(|| contended::<SysLock>(t, 2_000))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
