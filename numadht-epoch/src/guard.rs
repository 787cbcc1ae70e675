//! Guard and Handle for critical section management.
//!
//! - Pin: publish the global epoch in the thread's slot, mark it active
//! - Advance: per-request quiescent point, periodic epoch bump and sweep
//! - Retire: tag an unlinked pointer with the current epoch, defer the free

use crate::retired::{self, DestructorFn, Retired};
use crate::slot::{self, ADVANCE_FREQ, EpochState, SWEEP_THRESHOLD};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;

/// RAII guard representing an active critical section.
///
/// While a Guard exists the thread's slot stays active at the epoch it was
/// pinned in, so nothing retired after that point is freed underneath any
/// `Shared<'g, T>` loaded through it.
///
/// Nested `pin()` calls share the outermost guard's epoch. The slot goes
/// quiescent when the last guard on the thread is dropped.
pub struct Guard {
    _marker: PhantomData<*mut ()>,
}

impl Guard {
    /// Epoch this thread was pinned in.
    pub fn epoch(&self) -> u64 {
        HANDLE.with(|handle| handle.pinned_epoch.get())
    }
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        HANDLE.with(|handle| handle.unpin());
    }
}

impl core::fmt::Debug for Guard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

/// Thread-local reclamation state.
struct Handle {
    /// Slot index, allocated on first pin.
    tid: Cell<Option<usize>>,
    /// Number of live Guard instances on this thread.
    pin_count: Cell<usize>,
    pinned_epoch: Cell<u64>,
    /// Global epoch as of this thread's last `advance()`.
    local_epoch: Cell<u64>,
    advances: Cell<u64>,
    bag: RefCell<Vec<Retired>>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            tid: Cell::new(None),
            pin_count: Cell::new(0),
            pinned_epoch: Cell::new(0),
            local_epoch: Cell::new(0),
            advances: Cell::new(0),
            bag: RefCell::new(Vec::new()),
        }
    }

    #[inline]
    fn tid(&self, global: &EpochState) -> usize {
        match self.tid.get() {
            Some(tid) => tid,
            None => {
                let tid = global.alloc_tid();
                self.tid.set(Some(tid));
                tid
            }
        }
    }

    fn pin(&self) -> Guard {
        let count = self.pin_count.get();
        self.pin_count.set(count + 1);
        if count == 0 {
            let global = slot::global();
            let tid = self.tid(global);
            self.pinned_epoch.set(global.activate(tid));
        }
        Guard {
            _marker: PhantomData,
        }
    }

    fn unpin(&self) {
        let count = self.pin_count.get();
        debug_assert!(count > 0, "Guard dropped with pin_count == 0");
        self.pin_count.set(count - 1);
        if count == 1 {
            if let Some(tid) = self.tid.get() {
                slot::global().quiesce(tid);
            }
        }
    }

    fn advance(&self) {
        let global = slot::global();
        let n = self.advances.get() + 1;
        self.advances.set(n);

        let bumped = n.is_multiple_of(ADVANCE_FREQ);
        if bumped {
            global.bump_epoch();
        }
        self.local_epoch.set(global.epoch());

        let pending = self.bag.borrow().len();
        if pending >= SWEEP_THRESHOLD || (bumped && pending > 0) {
            self.sweep(global, false);
        } else if bumped {
            global.sweep_orphans(global.reclaim_bound(), false);
        }
    }

    fn flush(&self) -> usize {
        let global = slot::global();
        global.bump_epoch();
        self.local_epoch.set(global.epoch());
        self.sweep(global, true)
    }

    /// Free whatever in the local bag (and the orphan list) is unreachable.
    fn sweep(&self, global: &EpochState, wait: bool) -> usize {
        let bound = global.reclaim_bound();
        // Destructors run after the borrow ends so they may retire in turn.
        let ready = retired::split_ready(&mut self.bag.borrow_mut(), bound);
        global.reclaim(ready) + global.sweep_orphans(bound, wait)
    }

    fn retire(&self, entry: Retired) {
        self.bag.borrow_mut().push(entry);
    }

    fn cleanup(&self) {
        let global = slot::global();
        let bag = core::mem::take(&mut *self.bag.borrow_mut());
        global.adopt(bag);
        if let Some(tid) = self.tid.take() {
            global.free_tid(tid);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.cleanup();
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Enter a critical section.
///
/// Returns a `Guard`; pointers loaded through it stay valid until it drops.
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|handle| handle.pin())
}

/// Announce that the calling thread finished a request.
///
/// Call once per completed operation whatever its outcome. Every
/// [`ADVANCE_FREQ`] calls the global epoch moves forward; retired memory
/// that no pinned thread can still observe is freed opportunistically.
/// Never blocks.
#[inline]
pub fn advance() {
    HANDLE.with(|handle| handle.advance());
}

/// Bump the global epoch and free everything that is already safe to free,
/// including bags left behind by exited threads.
///
/// Returns the number of entries reclaimed.
pub fn flush() -> usize {
    HANDLE.with(|handle| handle.flush())
}

/// Number of `advance()` calls made by the current thread.
pub fn advances() -> u64 {
    HANDLE.with(|handle| handle.advances.get())
}

/// Global epoch as observed by the current thread's last `advance()`.
pub fn local_epoch() -> u64 {
    HANDLE.with(|handle| handle.local_epoch.get())
}

/// Number of entries waiting in the current thread's bag.
pub fn pending() -> usize {
    HANDLE.with(|handle| handle.bag.borrow().len())
}

/// Retire a boxed value for later reclamation.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and must not be retired twice.
/// - `ptr` must already be unreachable for threads that pin after this call.
pub unsafe fn retire<T: Send + 'static>(ptr: *mut T) {
    unsafe { retire_with(ptr.cast(), retired::drop_boxed::<T>) }
}

/// Retire `ptr`, running `destructor(ptr)` once it is safe to do so.
///
/// # Safety
///
/// Same contract as [`retire`]; `destructor` must be sound to call on `ptr`
/// from any thread.
pub unsafe fn retire_with(ptr: *mut (), destructor: DestructorFn) {
    let global = slot::global();
    let mut entry = Some(Retired::new(ptr, destructor, global.retire_epoch()));
    let _ = HANDLE.try_with(|handle| {
        if let Some(entry) = entry.take() {
            handle.retire(entry);
        }
    });
    // During thread teardown the local bag is gone; park the entry globally.
    if let Some(entry) = entry {
        global.adopt(alloc::vec![entry]);
    }
}
