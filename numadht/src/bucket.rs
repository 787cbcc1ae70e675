//! Fixed-capacity buckets.
//!
//! Readers scan without locking: each slot carries the signature of its
//! record so most mismatches never touch the record. Mutators hold the
//! bucket lock. A record is published by storing the pointer before the
//! signature, so a reader that sees a signature also sees its record.

use crate::error::{DhtError, Result};
use crate::mode::Mode;
use crate::record::Record;
use core::sync::atomic::{AtomicBool, Ordering};
use numadht_epoch::{Atomic, Guard, Shared, TTas, TTasGuard};
use portable_atomic::AtomicU64;

pub(crate) struct Slot<M: Mode> {
    sig: AtomicU64,
    rec: Atomic<Record<M>>,
}

impl<M: Mode> Slot<M> {
    fn empty() -> Self {
        Self {
            sig: AtomicU64::new(0),
            rec: Atomic::null(),
        }
    }

    #[inline]
    fn publish(&self, rec: *mut Record<M>, sig: u64) {
        self.rec.store_raw(rec, Ordering::Release);
        self.sig.store(sig, Ordering::Release);
    }
}

/// Result of an insert attempt under the bucket lock.
pub(crate) enum Upsert<M: Mode> {
    Inserted,
    /// The key existed; the previous record is now unlinked.
    Replaced(*mut Record<M>),
    Full,
}

pub(crate) struct Bucket<M: Mode> {
    lock: TTas<()>,
    /// Set under `lock` once a split has replaced this bucket.
    retired: AtomicBool,
    local_depth: u32,
    /// Low `local_depth` signature bits shared by every key in the bucket.
    prefix: u64,
    node: u32,
    slots: Box<[Slot<M>]>,
}

impl<M: Mode> Bucket<M> {
    pub(crate) fn new(capacity: usize, local_depth: u32, prefix: u64, node: u32) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| DhtError::Alloc {
                what: "bucket",
                bytes: capacity.saturating_mul(core::mem::size_of::<Slot<M>>()),
            })?;
        slots.extend((0..capacity).map(|_| Slot::empty()));
        Ok(Self {
            lock: TTas::new(()),
            retired: AtomicBool::new(false),
            local_depth,
            prefix,
            node,
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn local_depth(&self) -> u32 {
        self.local_depth
    }

    #[inline]
    pub(crate) fn prefix(&self) -> u64 {
        self.prefix
    }

    #[inline]
    pub(crate) fn node(&self) -> u32 {
        self.node
    }

    /// Slot array, for placement.
    pub(crate) fn slots_region(&self) -> (*const u8, usize) {
        (
            self.slots.as_ptr().cast(),
            core::mem::size_of_val(&*self.slots),
        )
    }

    #[inline]
    pub(crate) fn lock(&self) -> TTasGuard<'_, ()> {
        self.lock.lock()
    }

    #[inline]
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Caller holds the lock.
    pub(crate) fn mark_retired(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Whether `sig` belongs in this bucket.
    #[inline]
    pub(crate) fn covers(&self, sig: u64) -> bool {
        sig & low_mask(self.local_depth) == self.prefix
    }

    /// Lock-free lookup.
    pub(crate) fn find<'g>(&self, sig: u64, key: &[u8], guard: &'g Guard) -> Option<&'g Record<M>> {
        for slot in self.slots.iter() {
            if slot.sig.load(Ordering::Acquire) != sig {
                continue;
            }
            let rec = slot.rec.load(Ordering::Acquire, guard);
            // SAFETY: records reachable from a bucket are retired, never
            // freed, while a guard pinned before their retirement is alive.
            if let Some(rec) = unsafe { rec.as_ref() } {
                if rec.matches(sig, key) {
                    return Some(rec);
                }
            }
        }
        None
    }

    /// Insert or replace. Caller holds the lock.
    pub(crate) fn upsert(&self, rec: *mut Record<M>, guard: &Guard) -> Upsert<M> {
        // SAFETY: `rec` is a fresh record owned by the caller.
        let (sig, key) = unsafe { ((*rec).signature, (*rec).key()) };
        let mut free = None;
        for slot in self.slots.iter() {
            let cur = slot.rec.load(Ordering::Acquire, guard);
            match unsafe { cur.as_ref() } {
                None => {
                    if free.is_none() {
                        free = Some(slot);
                    }
                }
                Some(old) if old.matches(sig, key) => {
                    let prev = slot.rec.swap(Shared::from_raw(rec), Ordering::AcqRel, guard);
                    return Upsert::Replaced(prev.as_raw());
                }
                Some(_) => {}
            }
        }
        match free {
            Some(slot) => {
                slot.publish(rec, sig);
                Upsert::Inserted
            }
            None => Upsert::Full,
        }
    }

    /// Unlink the record for `key`. Caller holds the lock.
    pub(crate) fn remove<'g>(
        &self,
        sig: u64,
        key: &[u8],
        guard: &'g Guard,
    ) -> Option<Shared<'g, Record<M>>> {
        for slot in self.slots.iter() {
            if slot.sig.load(Ordering::Relaxed) != sig {
                continue;
            }
            let cur = slot.rec.load(Ordering::Acquire, guard);
            if unsafe { cur.as_ref() }.is_some_and(|rec| rec.matches(sig, key)) {
                slot.rec.store(Shared::null(), Ordering::Release);
                slot.sig.store(0, Ordering::Release);
                return Some(cur);
            }
        }
        None
    }

    /// Place an existing record while building a fresh bucket.
    ///
    /// Only valid before the bucket is published.
    pub(crate) fn adopt(&self, rec: *mut Record<M>, sig: u64) -> bool {
        for slot in self.slots.iter() {
            if slot.rec.load_raw(Ordering::Relaxed).is_null() {
                slot.publish(rec, sig);
                return true;
            }
        }
        false
    }

    /// Occupied slots as raw `(record, signature)` pairs. Caller holds the
    /// lock or owns the bucket exclusively.
    pub(crate) fn records(&self) -> impl Iterator<Item = (*mut Record<M>, u64)> + '_ {
        self.slots.iter().filter_map(|slot| {
            let rec = slot.rec.load_raw(Ordering::Acquire);
            (!rec.is_null()).then(|| (rec, slot.sig.load(Ordering::Relaxed)))
        })
    }

    pub(crate) fn occupied(&self) -> usize {
        self.records().count()
    }
}

/// Mask selecting the low `depth` bits.
#[inline]
pub(crate) fn low_mask(depth: u32) -> u64 {
    if depth >= 64 { u64::MAX } else { (1u64 << depth) - 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{IntEntry, IntMode};
    use numadht_epoch::pin;

    fn rec(key: u64, value: u64) -> *mut Record<IntMode> {
        // Identity signatures keep the arithmetic readable.
        Box::into_raw(Box::new(Record::new(key, IntEntry::new(key, value))))
    }

    fn free_all(bucket: &Bucket<IntMode>) {
        for (r, _) in bucket.records() {
            unsafe { drop(Box::from_raw(r)) };
        }
    }

    #[test]
    fn insert_find_replace_remove() {
        let bucket = Bucket::<IntMode>::new(2, 0, 0, 0).unwrap();
        let guard = pin();
        let _l = bucket.lock();

        assert!(matches!(bucket.upsert(rec(1, 10), &guard), Upsert::Inserted));
        assert!(matches!(bucket.upsert(rec(2, 20), &guard), Upsert::Inserted));
        let third = rec(3, 30);
        assert!(matches!(bucket.upsert(third, &guard), Upsert::Full));
        unsafe { drop(Box::from_raw(third)) };

        let found = bucket.find(1, &1u64.to_ne_bytes(), &guard).unwrap();
        assert_eq!(found.entry.value(), 10);

        match bucket.upsert(rec(1, 11), &guard) {
            Upsert::Replaced(old) => unsafe {
                assert_eq!((*old).entry.value(), 10);
                drop(Box::from_raw(old));
            },
            _ => panic!("expected replace"),
        }
        assert_eq!(
            bucket.find(1, &1u64.to_ne_bytes(), &guard).unwrap().entry.value(),
            11
        );

        let gone = bucket.remove(2, &2u64.to_ne_bytes(), &guard).unwrap();
        unsafe { drop(Box::from_raw(gone.as_raw())) };
        assert!(bucket.find(2, &2u64.to_ne_bytes(), &guard).is_none());
        assert!(bucket.remove(2, &2u64.to_ne_bytes(), &guard).is_none());
        assert_eq!(bucket.occupied(), 1);

        free_all(&bucket);
    }

    #[test]
    fn signature_collision_compares_keys() {
        let bucket = Bucket::<IntMode>::new(4, 0, 0, 0).unwrap();
        let guard = pin();
        let _l = bucket.lock();
        // Same signature, different keys.
        let a = Box::into_raw(Box::new(Record::new(7, IntEntry::new(100, 1))));
        let b = Box::into_raw(Box::new(Record::new(7, IntEntry::new(200, 2))));
        assert!(matches!(bucket.upsert(a, &guard), Upsert::Inserted));
        assert!(matches!(bucket.upsert(b, &guard), Upsert::Inserted));
        assert_eq!(
            bucket.find(7, &200u64.to_ne_bytes(), &guard).unwrap().entry.value(),
            2
        );
        assert!(bucket.find(7, &300u64.to_ne_bytes(), &guard).is_none());
        free_all(&bucket);
    }

    #[test]
    fn oversized_capacity_is_alloc_error() {
        let res = Bucket::<IntMode>::new(usize::MAX / 4, 0, 0, 0);
        assert!(matches!(
            res,
            Err(DhtError::Alloc { what: "bucket", bytes: usize::MAX })
        ));
    }

    #[test]
    fn coverage_by_prefix() {
        let bucket = Bucket::<IntMode>::new(1, 2, 0b01, 0).unwrap();
        assert!(bucket.covers(0b1101));
        assert!(!bucket.covers(0b1110));
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(3), 0b111);
        assert_eq!(low_mask(64), u64::MAX);
    }
}
