//! Extendible-hash directory with lazy, NUMA-placed bucket splits.
//!
//! The directory is a table of `2^depth` bucket pointers indexed by the low
//! bits of a key's signature. A bucket of local depth `ld < depth` is shared
//! by every slot whose low `ld` bits equal its prefix.
//!
//! Splits happen one bucket at a time, when an insert finds its bucket
//! full. Lock order is bucket, then the directory grow lock; only splits
//! take the grow lock. The replaced bucket keeps its record pointers until
//! it is reclaimed, so a reader that loaded it before the split still finds
//! everything that was in it.

use crate::bucket::{Bucket, Upsert, low_mask};
use crate::config::Config;
use crate::error::{DhtError, Result};
use crate::mode::Mode;
use crate::numa::Placer;
use crate::record::{Context, Record, RecordStore, Status};
use crate::tracing_helpers::{debug_log, error_log, trace_log};
use core::sync::atomic::Ordering;
use crossbeam_utils::{Backoff, CachePadded};
use numadht_epoch::{Atomic, Guard, TTas, TTasGuard, pin, retire};
use portable_atomic::AtomicU64;

/// Directory table: `2^depth` bucket pointers.
struct Table<M: Mode> {
    depth: u32,
    slots: Box<[Atomic<Bucket<M>>]>,
}

impl<M: Mode> Table<M> {
    fn with_depth(depth: u32) -> Result<Self> {
        let len = 1usize.checked_shl(depth).ok_or(DhtError::Alloc {
            what: "directory",
            bytes: usize::MAX,
        })?;
        let mut slots = Vec::new();
        slots.try_reserve_exact(len).map_err(|_| DhtError::Alloc {
            what: "directory",
            bytes: len.saturating_mul(core::mem::size_of::<Atomic<Bucket<M>>>()),
        })?;
        slots.extend((0..len).map(|_| Atomic::null()));
        Ok(Self {
            depth,
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    fn index(&self, sig: u64) -> usize {
        (sig & low_mask(self.depth)) as usize
    }
}

/// Point-in-time directory counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Live records.
    pub records: u64,
    /// Live buckets.
    pub buckets: u64,
    /// Bucket splits since creation.
    pub splits: u64,
    /// Directory doublings since creation.
    pub doublings: u64,
    /// Global depth.
    pub depth: u32,
    /// Live buckets per NUMA node.
    pub node_buckets: Vec<u64>,
}

pub(crate) struct Directory<M: Mode> {
    table: Atomic<Table<M>>,
    grow: TTas<()>,
    capacity: usize,
    max_depth: u32,
    placer: Placer,
    store: RecordStore,
    len: CachePadded<AtomicU64>,
    splits: AtomicU64,
    doublings: AtomicU64,
    buckets: AtomicU64,
    node_buckets: Box<[AtomicU64]>,
}

impl<M: Mode> Directory<M> {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let placer = Placer::new(config.placement, config.bind_memory);
        let depth = config.initial_depth;
        let table = Table::<M>::with_depth(depth)?;
        let node_buckets: Box<[AtomicU64]> =
            (0..placer.nodes()).map(|_| AtomicU64::new(0)).collect();

        let dir = Self {
            table: Atomic::null(),
            grow: TTas::new(()),
            capacity: config.bucket_capacity,
            max_depth: config.max_depth,
            placer,
            store: RecordStore::new(config.record_quota, placer),
            len: CachePadded::new(AtomicU64::new(0)),
            splits: AtomicU64::new(0),
            doublings: AtomicU64::new(0),
            buckets: AtomicU64::new(0),
            node_buckets,
        };
        // Install the table first so `Drop` cleans up after a failed bucket.
        dir.table.store_raw(Box::into_raw(Box::new(table)), Ordering::Release);
        // SAFETY: not yet shared.
        let table = unsafe { &*dir.table.load_raw(Ordering::Relaxed) };
        for (prefix, slot) in table.slots.iter().enumerate() {
            let bucket = dir.new_bucket(depth, prefix as u64)?;
            slot.store_raw(bucket, Ordering::Release);
        }
        debug_log!(
            mode = M::NAME,
            depth,
            capacity = dir.capacity,
            nodes = dir.node_buckets.len(),
            "directory created"
        );
        Ok(dir)
    }

    pub(crate) fn store(&self) -> &RecordStore {
        &self.store
    }

    #[inline]
    fn table<'g>(&self, guard: &'g Guard) -> &'g Table<M> {
        // SAFETY: the table is never null after construction; replaced
        // tables are retired, so it stays valid for the guard's lifetime.
        unsafe { self.table.load(Ordering::Acquire, guard).deref() }
    }

    #[inline]
    fn bucket_for<'g>(&self, sig: u64, guard: &'g Guard) -> &'g Bucket<M> {
        let table = self.table(guard);
        let bucket = table.slots[table.index(sig)].load(Ordering::Acquire, guard);
        // SAFETY: every slot of a published table points at a bucket;
        // replaced buckets are retired, never freed under a live guard.
        unsafe { bucket.deref() }
    }

    /// Allocate a bucket for `prefix` at `local_depth` and account for it.
    fn new_bucket(&self, local_depth: u32, prefix: u64) -> Result<*mut Bucket<M>> {
        let node = self.placer.bucket_node(prefix, local_depth);
        let bucket = Bucket::new(self.capacity, local_depth, prefix, node)?;
        let (ptr, len) = bucket.slots_region();
        self.placer.bind(ptr, len, node);
        self.buckets.fetch_add(1, Ordering::Relaxed);
        if let Some(n) = self.node_buckets.get(node as usize) {
            n.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Box::into_raw(Box::new(bucket)))
    }

    fn forget_bucket(&self, bucket: &Bucket<M>) {
        self.buckets.fetch_sub(1, Ordering::Relaxed);
        if let Some(n) = self.node_buckets.get(bucket.node() as usize) {
            n.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Lock the live bucket for `sig`, retrying past buckets retired by a
    /// concurrent split.
    fn lock_bucket<'g>(&self, sig: u64, guard: &'g Guard) -> (&'g Bucket<M>, TTasGuard<'g, ()>) {
        let backoff = Backoff::new();
        loop {
            let bucket = self.bucket_for(sig, guard);
            let lock = bucket.lock();
            if !bucket.is_retired() {
                return (bucket, lock);
            }
            drop(lock);
            backoff.spin();
        }
    }

    /// Install `rec`, splitting full buckets on the way.
    ///
    /// On error the record is freed and its quota claim returned.
    pub(crate) fn put(&self, rec: Box<Record<M>>) -> Result<()> {
        let sig = rec.signature;
        let rec = Box::into_raw(rec);
        let guard = pin();
        loop {
            let (bucket, lock) = self.lock_bucket(sig, &guard);
            match bucket.upsert(rec, &guard) {
                Upsert::Inserted => {
                    drop(lock);
                    self.len.fetch_add(1, Ordering::Relaxed);
                    trace_log!(sig, "put: inserted");
                    return Ok(());
                }
                Upsert::Replaced(old) => {
                    drop(lock);
                    // SAFETY: unlinked under the bucket lock; retired once.
                    unsafe { retire(old) };
                    self.store.release();
                    trace_log!(sig, "put: replaced");
                    return Ok(());
                }
                Upsert::Full => {}
            }

            let split = if bucket.local_depth() >= self.max_depth {
                Err(DhtError::DirectoryExhausted {
                    depth: bucket.local_depth(),
                })
            } else {
                self.split(bucket, &guard)
            };
            drop(lock);

            match split {
                // SAFETY: `split` unlinked and marked the old bucket; nothing
                // new can reach it.
                Ok(old) => unsafe { retire(old) },
                Err(err) => {
                    debug_log!(sig, error = %err, "put failed");
                    // SAFETY: never published.
                    drop(unsafe { Box::from_raw(rec) });
                    self.store.release();
                    return Err(err);
                }
            }
        }
    }

    /// Split `bucket`, whose lock the caller holds. Returns the replaced
    /// bucket, already unlinked and marked retired.
    fn split(&self, bucket: &Bucket<M>, guard: &Guard) -> Result<*mut Bucket<M>> {
        let _grow = self.grow.lock();
        let mut table = self.table(guard);
        let ld = bucket.local_depth();

        if ld > table.depth {
            invariant_violation(format_args!(
                "bucket local depth {ld} exceeds global depth {}",
                table.depth
            ));
        }
        if ld == table.depth {
            table = self.double(table, guard)?;
        }

        let prefix = bucket.prefix();
        let high = prefix | (1u64 << ld);
        let lo = self.new_bucket(ld + 1, prefix)?;
        let hi = match self.new_bucket(ld + 1, high) {
            Ok(hi) => hi,
            Err(err) => {
                // SAFETY: `lo` was never published.
                let lo = unsafe { Box::from_raw(lo) };
                self.forget_bucket(&lo);
                return Err(err);
            }
        };

        // SAFETY: both halves are private until the slot rewrite below.
        let (lo_ref, hi_ref) = unsafe { (&*lo, &*hi) };
        for (rec, sig) in bucket.records() {
            debug_assert!(bucket.covers(sig));
            let target = if (sig >> ld) & 1 == 0 { lo_ref } else { hi_ref };
            if !target.adopt(rec, sig) {
                invariant_violation(format_args!("split half overflowed at depth {ld}"));
            }
        }

        let old = bucket as *const Bucket<M> as *mut Bucket<M>;
        let stride = 1usize << ld;
        let mut rewired = 0usize;
        for i in (prefix as usize..table.slots.len()).step_by(stride) {
            let slot = &table.slots[i];
            if slot.load_raw(Ordering::Acquire) != old {
                invariant_violation(format_args!(
                    "directory slot {i} does not reference the bucket for prefix {prefix:#x}"
                ));
            }
            let half = if (i >> ld) & 1 == 0 { lo } else { hi };
            slot.store_raw(half, Ordering::Release);
            rewired += 1;
        }
        if rewired == 0 {
            invariant_violation(format_args!("no directory slot for prefix {prefix:#x}"));
        }

        bucket.mark_retired();
        self.forget_bucket(bucket);
        self.splits.fetch_add(1, Ordering::Relaxed);
        debug_log!(
            mode = M::NAME,
            prefix,
            local_depth = ld + 1,
            lo = lo_ref.occupied(),
            hi = hi_ref.occupied(),
            lo_node = lo_ref.node(),
            hi_node = hi_ref.node(),
            "bucket split"
        );
        Ok(old)
    }

    /// Double the table. Caller holds the grow lock.
    fn double<'g>(&self, table: &'g Table<M>, guard: &'g Guard) -> Result<&'g Table<M>> {
        let depth = table.depth + 1;
        let next = Table::<M>::with_depth(depth)?;
        let half = table.slots.len();
        for (i, slot) in next.slots.iter().enumerate() {
            slot.store_raw(table.slots[i % half].load_raw(Ordering::Acquire), Ordering::Relaxed);
        }
        let next = Box::into_raw(Box::new(next));
        let old = self.table.load(Ordering::Acquire, guard).as_raw();
        self.table.store_raw(next, Ordering::Release);
        // SAFETY: unlinked above; readers that loaded it stay pinned.
        unsafe { retire(old) };
        self.doublings.fetch_add(1, Ordering::Relaxed);
        debug_log!(mode = M::NAME, depth, "directory doubled");
        // SAFETY: just published; only retired by a later doubling, which
        // cannot run before this guard drops its reference.
        Ok(unsafe { &*next })
    }

    /// Lock-free lookup; fills `ctx` on a hit.
    pub(crate) fn get(&self, ctx: &mut Context<M>) -> Status {
        let guard = pin();
        let bucket = self.bucket_for(ctx.signature, &guard);
        match bucket.find(ctx.signature, ctx.key_bytes(), &guard) {
            Some(rec) => {
                M::load_value(&rec.entry, &mut ctx.buf);
                Status::Found
            }
            None => Status::NotFound,
        }
    }

    /// Unlink and retire the record for `ctx`'s key, loading its value into
    /// `ctx` first.
    pub(crate) fn delete(&self, ctx: &mut Context<M>) -> Status {
        let guard = pin();
        let sig = ctx.signature;
        let (bucket, lock) = self.lock_bucket(sig, &guard);
        let Some(rec) = bucket.remove(sig, ctx.key_bytes(), &guard) else {
            return Status::NotFound;
        };
        drop(lock);
        // SAFETY: unlinked under the lock; still valid under `guard`.
        M::load_value(unsafe { &rec.deref().entry }, &mut ctx.buf);
        unsafe { retire(rec.as_raw()) };
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.store.release();
        trace_log!(sig, "delete: removed");
        Status::Found
    }

    pub(crate) fn len(&self) -> u64 {
        self.len.load(Ordering::Relaxed)
    }

    pub(crate) fn depth(&self) -> u32 {
        let guard = pin();
        self.table(&guard).depth
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats {
            records: self.len(),
            buckets: self.buckets.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            doublings: self.doublings.load(Ordering::Relaxed),
            depth: self.depth(),
            node_buckets: self
                .node_buckets
                .iter()
                .map(|n| n.load(Ordering::Relaxed))
                .collect(),
        }
    }

    /// Walk the live structure checking the extendible-hashing invariants.
    /// Returns the number of distinct live buckets.
    #[cfg(test)]
    pub(crate) fn check(&self) -> usize {
        let guard = pin();
        let table = self.table(&guard);
        let mut distinct = 0;
        for (i, slot) in table.slots.iter().enumerate() {
            let bucket = unsafe { slot.load(Ordering::Acquire, &guard).deref() };
            assert!(!bucket.is_retired(), "slot {i} references a retired bucket");
            assert!(bucket.local_depth() <= table.depth);
            assert!(bucket.covers(i as u64), "slot {i} outside bucket prefix");
            if i as u64 == bucket.prefix() {
                distinct += 1;
                for (rec, sig) in bucket.records() {
                    assert!(bucket.covers(sig));
                    assert_eq!(unsafe { (*rec).signature }, sig);
                }
            }
        }
        distinct
    }
}

impl<M: Mode> Drop for Directory<M> {
    fn drop(&mut self) {
        let table = *self.table.get_mut();
        if table.is_null() {
            return;
        }
        // SAFETY: `&mut self`; no other thread can reach the directory.
        let table = unsafe { Box::from_raw(table) };
        for (i, slot) in table.slots.iter().enumerate() {
            let bucket = slot.load_raw(Ordering::Relaxed);
            if bucket.is_null() {
                continue;
            }
            // Each live bucket is freed from its canonical slot only.
            let canonical = unsafe { (*bucket).prefix() } == i as u64;
            if canonical {
                let bucket = unsafe { Box::from_raw(bucket) };
                for (rec, _) in bucket.records() {
                    drop(unsafe { Box::from_raw(rec) });
                }
            }
        }
    }
}

/// Structural corruption: log and abort.
#[cold]
fn invariant_violation(msg: core::fmt::Arguments<'_>) -> ! {
    error_log!(%msg, "directory invariant violated");
    #[cfg(not(feature = "tracing"))]
    let _ = msg;
    std::process::abort()
}
