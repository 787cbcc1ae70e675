//! Concurrent puts, context-reuse reads and deletes on a NUMA-placed store.
//!
//! Run with `--features tracing` and `RUST_LOG=numadht=debug` to watch
//! buckets split and the directory double.

use numadht::{Config, Context, IntDht, Placement};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const THREADS: u64 = 8;
const PER_THREAD: u64 = 10_000;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let topology = numadht::numa::topology();
    println!("=== numadht concurrent demo ===");
    println!("NUMA nodes: {}\n", topology.nodes());

    let config = Config::from_env()
        .placement(Placement::HashRange)
        .bucket_capacity(8);
    let dht = Arc::new(IntDht::with_config(config).expect("directory allocation"));

    println!("Concurrent puts...");
    let start = Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let dht = Arc::clone(&dht);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let key = tid * PER_THREAD + i;
                    dht.put(key, key * 2).expect("put");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let total = THREADS * PER_THREAD;
    let elapsed = start.elapsed();
    println!(
        "Put {total} records from {THREADS} threads in {elapsed:?} ({:.2} ops/sec)",
        total as f64 / elapsed.as_secs_f64()
    );

    let stats = dht.stats();
    println!(
        "depth {}, {} buckets, {} splits, {} doublings",
        stats.depth, stats.buckets, stats.splits, stats.doublings
    );
    for (node, n) in stats.node_buckets.iter().enumerate() {
        println!("  node {node}: {n} buckets");
    }
    println!();

    println!("Concurrent context-reuse reads...");
    let start = Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let dht = Arc::clone(&dht);
            thread::spawn(move || {
                let mut ctx = Context::new_int(0);
                let mut found = 0u64;
                for key in 0..total {
                    ctx.set_key(key);
                    if dht.get_with_context(&mut ctx).is_found() && ctx.value() == key * 2 {
                        found += 1;
                    }
                }
                found
            })
        })
        .collect();
    let found: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let elapsed = start.elapsed();
    println!(
        "{found} hits over {} reads in {elapsed:?} ({:.2} ops/sec)\n",
        total * THREADS,
        (total * THREADS) as f64 / elapsed.as_secs_f64()
    );

    println!("Concurrent deletes...");
    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let dht = Arc::clone(&dht);
            thread::spawn(move || {
                for i in (0..PER_THREAD).step_by(2) {
                    dht.delete(tid * PER_THREAD + i).expect("delete");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    println!("Remaining records: {}", dht.len());

    let reclaimed = numadht_epoch::flush();
    let epoch = numadht_epoch::stats();
    println!(
        "Reclaimer: epoch {}, retired {}, reclaimed {} ({reclaimed} by the final flush)",
        epoch.epoch, epoch.retired, epoch.reclaimed
    );
}
