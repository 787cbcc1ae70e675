//! Retirement bag entries.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Type-erased destructor for a retired pointer.
pub type DestructorFn = unsafe fn(*mut ());

/// A pointer waiting for every active thread to move past `epoch`.
pub(crate) struct Retired {
    ptr: *mut (),
    destructor: DestructorFn,
    /// Global epoch observed right after the pointer was unlinked.
    epoch: u64,
}

// The pointee is unreachable from shared state once retired; the entry is
// only ever handed between threads through the orphan list.
unsafe impl Send for Retired {}

impl Retired {
    pub(crate) fn new(ptr: *mut (), destructor: DestructorFn, epoch: u64) -> Self {
        Self {
            ptr,
            destructor,
            epoch,
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Run the destructor.
    ///
    /// # Safety
    ///
    /// No thread may still hold a reference into the pointee.
    #[inline]
    pub(crate) unsafe fn reclaim(self) {
        unsafe { (self.destructor)(self.ptr) }
    }
}

/// Destructor for pointers that came out of `Box::into_raw`.
pub(crate) unsafe fn drop_boxed<T>(ptr: *mut ()) {
    drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
}

/// Move every entry retired strictly before `bound` out of `bag`.
///
/// Entry order in `bag` is not preserved.
pub(crate) fn split_ready(bag: &mut Vec<Retired>, bound: u64) -> Vec<Retired> {
    let mut ready = Vec::new();
    let mut i = 0;
    while i < bag.len() {
        if bag[i].epoch() < bound {
            ready.push(bag.swap_remove(i));
        } else {
            i += 1;
        }
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn noop(_: *mut ()) {}

    #[test]
    fn split_ready_takes_only_older_entries() {
        let mut bag: Vec<Retired> = (0..6)
            .map(|e| Retired::new(core::ptr::null_mut(), noop, e))
            .collect();
        let ready = split_ready(&mut bag, 3);
        let mut taken: Vec<u64> = ready.iter().map(Retired::epoch).collect();
        taken.sort_unstable();
        assert_eq!(taken, vec![0, 1, 2]);
        assert!(bag.iter().all(|r| r.epoch() >= 3));
        assert_eq!(bag.len(), 3);
    }
}
