//! TTAS (Test-Test-And-Set) spinlock.
//!
//! Used for the slot allocator and orphan list here, and by the hash
//! directory for its per-bucket and grow locks.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_utils::Backoff;

/// A TTAS (Test-Test-And-Set) lock protecting a `T`.
pub struct TTas<T: ?Sized> {
    acquired: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for TTas<T> {}
unsafe impl<T: ?Sized + Send> Sync for TTas<T> {}

impl<T> TTas<T> {
    /// Create a new unlocked TTAS wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            acquired: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Consume the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> TTas<T> {
    /// Acquire the lock, spinning with backoff until it is free.
    #[inline]
    pub fn lock(&self) -> TTasGuard<'_, T> {
        let backoff = Backoff::new();
        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.acquired.load(Ordering::Relaxed) {
                backoff.snooze();
            }
            if let Some(guard) = self.try_lock() {
                return guard;
            }
        }
    }

    /// Acquire the lock only if it is free right now.
    #[inline]
    pub fn try_lock(&self) -> Option<TTasGuard<'_, T>> {
        if self.acquired.swap(true, Ordering::Acquire) {
            None
        } else {
            Some(TTasGuard { ttas: self })
        }
    }

    /// Whether some thread currently holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Mutable access without locking; `&mut self` proves exclusivity.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for TTas<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard for the TTAS. Releases the lock on drop.
pub struct TTasGuard<'a, T: ?Sized> {
    ttas: &'a TTas<T>,
}

impl<T: ?Sized> Deref for TTasGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.ttas.data.get() }
    }
}

impl<T: ?Sized> DerefMut for TTasGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.ttas.data.get() }
    }
}

impl<T: ?Sized> Drop for TTasGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.ttas.acquired.store(false, Ordering::Release);
    }
}
