//! Global epoch state and the per-thread slot table.
//!
//! Each registered thread owns one slot holding `epoch << 1 | ACTIVE` while
//! it is pinned and `QUIESCENT` otherwise. Reclamation scans the table for
//! the oldest active epoch.

use crate::retired::{self, Retired};
use crate::ttas::TTas;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering, fence};
use crossbeam_utils::CachePadded;
use once_cell::race::OnceBox;
use portable_atomic::AtomicU64;

/// Maximum number of concurrently registered threads.
pub const MAX_THREADS: usize = 256;

/// Every `ADVANCE_FREQ` calls to `advance()` on a thread bump the global epoch.
pub const ADVANCE_FREQ: u64 = 64;

/// A thread sweeps its own bag once it holds this many entries.
pub const SWEEP_THRESHOLD: usize = 128;

const ACTIVE: u64 = 1;
const QUIESCENT: u64 = 0;

/// Process-wide reclamation state.
pub(crate) struct EpochState {
    epoch: CachePadded<AtomicU64>,
    slots: Box<[CachePadded<AtomicU64>]>,
    next_tid: AtomicUsize,
    free_tids: TTas<Vec<usize>>,
    /// Bags left behind by exited threads.
    orphans: TTas<Vec<Retired>>,
    retired: AtomicU64,
    reclaimed: AtomicU64,
}

impl EpochState {
    fn new() -> Self {
        let slots = (0..MAX_THREADS)
            .map(|_| CachePadded::new(AtomicU64::new(QUIESCENT)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            epoch: CachePadded::new(AtomicU64::new(0)),
            slots,
            next_tid: AtomicUsize::new(0),
            free_tids: TTas::new(Vec::new()),
            orphans: TTas::new(Vec::new()),
            retired: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Current global epoch.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Increment the global epoch, returning the new value.
    #[inline]
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish `tid` as active at the current global epoch.
    ///
    /// Loads through `Atomic` made after this call cannot observe pointers
    /// retired before the returned epoch was current.
    #[inline]
    pub(crate) fn activate(&self, tid: usize) -> u64 {
        let epoch = self.epoch();
        self.slots[tid].store((epoch << 1) | ACTIVE, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        epoch
    }

    /// Mark `tid` as holding no references.
    #[inline]
    pub(crate) fn quiesce(&self, tid: usize) {
        self.slots[tid].store(QUIESCENT, Ordering::Release);
    }

    /// Epoch tag for a pointer that has just been unlinked.
    #[inline]
    pub(crate) fn retire_epoch(&self) -> u64 {
        fence(Ordering::SeqCst);
        self.retired.fetch_add(1, Ordering::Relaxed);
        self.epoch.load(Ordering::SeqCst)
    }

    /// Entries tagged strictly below the returned bound may be freed.
    ///
    /// `u64::MAX` when no thread is pinned.
    pub(crate) fn reclaim_bound(&self) -> u64 {
        fence(Ordering::SeqCst);
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::SeqCst))
            .filter(|&raw| raw & ACTIVE == ACTIVE)
            .map(|raw| raw >> 1)
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Run destructors for entries already proven unreachable.
    pub(crate) fn reclaim(&self, ready: Vec<Retired>) -> usize {
        let n = ready.len();
        for entry in ready {
            // SAFETY: callers only pass entries split off below `reclaim_bound`.
            unsafe { entry.reclaim() };
        }
        if n > 0 {
            self.reclaimed.fetch_add(n as u64, Ordering::Relaxed);
        }
        n
    }

    /// Sweep the orphan list. With `wait == false` a contended list is skipped.
    pub(crate) fn sweep_orphans(&self, bound: u64, wait: bool) -> usize {
        let ready = {
            let orphans = if wait {
                Some(self.orphans.lock())
            } else {
                self.orphans.try_lock()
            };
            match orphans {
                Some(mut orphans) if !orphans.is_empty() => {
                    retired::split_ready(&mut orphans, bound)
                }
                _ => return 0,
            }
        };
        self.reclaim(ready)
    }

    /// Hand a bag over to the orphan list.
    pub(crate) fn adopt(&self, bag: Vec<Retired>) {
        if !bag.is_empty() {
            self.orphans.lock().extend(bag);
        }
    }

    pub(crate) fn retired_total(&self) -> u64 {
        self.retired.load(Ordering::Relaxed)
    }

    pub(crate) fn reclaimed_total(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Allocate a thread ID.
    pub(crate) fn alloc_tid(&self) -> usize {
        {
            let mut free = self.free_tids.lock();
            if let Some(tid) = free.pop() {
                return tid;
            }
        }
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        assert!(
            tid < MAX_THREADS,
            "numadht-epoch: exceeded maximum thread count ({MAX_THREADS})"
        );
        tid
    }

    /// Release a thread ID for recycling.
    pub(crate) fn free_tid(&self, tid: usize) {
        self.quiesce(tid);
        self.free_tids.lock().push(tid);
    }
}

static GLOBAL: OnceBox<EpochState> = OnceBox::new();

/// Get the process-wide reclamation state.
#[inline]
pub(crate) fn global() -> &'static EpochState {
    GLOBAL.get_or_init(|| Box::new(EpochState::new()))
}
