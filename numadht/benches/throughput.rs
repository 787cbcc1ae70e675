//! Throughput: numadht against dashmap.
//!
//! - numadht: extendible hashing, lock-free reads, epoch reclamation
//! - dashmap: sharded `RwLock` hash map
//!
//! `NUMADHT_PLACEMENT` selects the placement policy for the numadht runs.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use numadht::{Config, Context, IntDht, VarDht};
use rand::prelude::*;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

const SMALL_OPS: u64 = 1_000;
const MEDIUM_OPS: u64 = 10_000;
const LARGE_OPS: u64 = 100_000;

const THREAD_COUNTS: &[u64] = &[1, 2, 4, 8];

fn int_dht() -> IntDht {
    IntDht::with_config(Config::from_env()).unwrap()
}

fn bench_single_thread_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_put");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size));

        group.bench_with_input(BenchmarkId::new("numadht", size), &size, |b, &size| {
            b.iter(|| {
                let dht = int_dht();
                for i in 0..size {
                    dht.put(black_box(i), black_box(i * 2)).unwrap();
                }
                dht
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", size), &size, |b, &size| {
            b.iter(|| {
                let map = dashmap::DashMap::new();
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_get");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size));

        group.bench_with_input(BenchmarkId::new("numadht/oneshot", size), &size, |b, &size| {
            let dht = int_dht();
            for i in 0..size {
                dht.put(i, i * 2).unwrap();
            }
            b.iter(|| {
                let mut sum = 0u64;
                for i in 0..size {
                    if let Some(ctx) = dht.get(black_box(i)).unwrap() {
                        sum = sum.wrapping_add(ctx.value());
                    }
                }
                sum
            });
        });

        group.bench_with_input(BenchmarkId::new("numadht/context", size), &size, |b, &size| {
            let dht = int_dht();
            for i in 0..size {
                dht.put(i, i * 2).unwrap();
            }
            b.iter(|| {
                let mut ctx = Context::new_int(0);
                let mut sum = 0u64;
                for i in 0..size {
                    ctx.set_key(black_box(i));
                    if dht.get_with_context(&mut ctx).is_found() {
                        sum = sum.wrapping_add(ctx.value());
                    }
                }
                sum
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", size), &size, |b, &size| {
            let map = dashmap::DashMap::new();
            for i in 0..size {
                map.insert(i, i * 2);
            }
            b.iter(|| {
                let mut sum = 0u64;
                for i in 0..size {
                    if let Some(v) = map.get(&black_box(i)) {
                        sum = sum.wrapping_add(*v);
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

fn bench_var_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("var_put_get");
    let keys: Vec<Vec<u8>> = (0..MEDIUM_OPS)
        .map(|i| format!("key:{i:08}").into_bytes())
        .collect();
    let value = vec![0xabu8; 64];
    group.throughput(Throughput::Elements(MEDIUM_OPS));

    group.bench_function("numadht", |b| {
        b.iter(|| {
            let dht = VarDht::with_config(Config::from_env()).unwrap();
            for k in &keys {
                dht.put(k, &value).unwrap();
            }
            let mut ctx = Context::new_var(b"", value.len()).unwrap();
            for k in &keys {
                ctx.set_key(k).unwrap();
                black_box(dht.get_with_context(&mut ctx));
            }
            dht
        });
    });

    group.bench_function("dashmap", |b| {
        b.iter(|| {
            let map = dashmap::DashMap::new();
            for k in &keys {
                map.insert(k.clone(), value.clone());
            }
            for k in &keys {
                black_box(map.get(k).map(|v| v.len()));
            }
            map
        });
    });

    group.finish();
}

fn bench_concurrent_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_put");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops = MEDIUM_OPS / threads;
        group.throughput(Throughput::Elements(ops * threads));

        group.bench_with_input(BenchmarkId::new("numadht", threads), &threads, |b, &threads| {
            b.iter(|| {
                let dht = Arc::new(int_dht());
                let handles: Vec<_> = (0..threads)
                    .map(|tid| {
                        let dht = Arc::clone(&dht);
                        thread::spawn(move || {
                            for i in 0..ops {
                                let key = tid * ops + i;
                                dht.put(black_box(key), black_box(key * 2)).unwrap();
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
                dht
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", threads), &threads, |b, &threads| {
            b.iter(|| {
                let map = Arc::new(dashmap::DashMap::new());
                let handles: Vec<_> = (0..threads)
                    .map(|tid| {
                        let map = Arc::clone(&map);
                        thread::spawn(move || {
                            for i in 0..ops {
                                let key = tid * ops + i;
                                map.insert(black_box(key), black_box(key * 2));
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
                map
            });
        });
    }

    group.finish();
}

/// 90% reads, 10% overwrites over a pre-filled key space.
fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops = MEDIUM_OPS / threads;
        group.throughput(Throughput::Elements(ops * threads));

        let dht = Arc::new(int_dht());
        let map = Arc::new(dashmap::DashMap::new());
        for i in 0..MEDIUM_OPS {
            dht.put(i, i).unwrap();
            map.insert(i, i);
        }

        group.bench_with_input(BenchmarkId::new("numadht", threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|tid| {
                        let dht = Arc::clone(&dht);
                        thread::spawn(move || {
                            let mut rng = StdRng::seed_from_u64(tid);
                            let mut ctx = Context::new_int(0);
                            for _ in 0..ops {
                                let key = rng.random_range(0..MEDIUM_OPS);
                                if rng.random_range(0..10) == 0 {
                                    dht.put(key, key).unwrap();
                                } else {
                                    ctx.set_key(key);
                                    black_box(dht.get_with_context(&mut ctx));
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("dashmap", threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|tid| {
                        let map = Arc::clone(&map);
                        thread::spawn(move || {
                            let mut rng = StdRng::seed_from_u64(tid);
                            for _ in 0..ops {
                                let key = rng.random_range(0..MEDIUM_OPS);
                                if rng.random_range(0..10) == 0 {
                                    map.insert(key, key);
                                } else {
                                    black_box(map.get(&key).map(|v| *v));
                                }
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_put,
    bench_single_thread_get,
    bench_var_put_get,
    bench_concurrent_put,
    bench_concurrent_mixed
);
criterion_main!(benches);
