//! Guard-scoped atomic pointers.
//!
//! `Atomic<T>` is a plain atomic pointer; loading through it requires a
//! [`Guard`] and yields a `Shared<'g, T>` that cannot outlive that guard.

use crate::guard::Guard;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// An atomic pointer to a heap-allocated `T`.
///
/// The pointer is not owned: dropping an `Atomic` never frees the pointee.
pub struct Atomic<T> {
    data: AtomicPtr<T>,
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Creates a new atomic pointer.
    #[inline]
    pub const fn new(ptr: *mut T) -> Self {
        Self {
            data: AtomicPtr::new(ptr),
        }
    }

    /// Creates a null atomic pointer.
    #[inline]
    pub const fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Boxes `value` and points at it.
    #[inline]
    pub fn from_box(value: alloc::boxed::Box<T>) -> Self {
        Self::new(alloc::boxed::Box::into_raw(value))
    }

    /// Loads the pointer under `guard`.
    #[inline]
    pub fn load<'g>(&self, order: Ordering, _guard: &'g Guard) -> Shared<'g, T> {
        Shared::from_raw(self.data.load(order))
    }

    /// Loads the raw pointer without a guard.
    ///
    /// Dereferencing the result is only sound when the caller otherwise
    /// excludes concurrent retirement (e.g. under a lock, or in `Drop`).
    #[inline]
    pub fn load_raw(&self, order: Ordering) -> *mut T {
        self.data.load(order)
    }

    /// Stores a pointer.
    #[inline]
    pub fn store(&self, ptr: Shared<'_, T>, order: Ordering) {
        self.data.store(ptr.data, order);
    }

    /// Stores a raw pointer.
    #[inline]
    pub fn store_raw(&self, ptr: *mut T, order: Ordering) {
        self.data.store(ptr, order);
    }

    /// Swaps the pointer, returning the previous one.
    #[inline]
    pub fn swap<'g>(
        &self,
        new: Shared<'_, T>,
        order: Ordering,
        _guard: &'g Guard,
    ) -> Shared<'g, T> {
        Shared::from_raw(self.data.swap(new.data, order))
    }

    /// Compares and exchanges the pointer.
    #[inline]
    pub fn compare_exchange<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _guard: &'g Guard,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        self.data
            .compare_exchange(current.data, new.data, success, failure)
            .map(Shared::from_raw)
            .map_err(Shared::from_raw)
    }

    /// Unsynchronized access; `&mut self` proves exclusivity.
    #[inline]
    pub fn get_mut(&mut self) -> &mut *mut T {
        self.data.get_mut()
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> core::fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Atomic({:p})", self.data.load(Ordering::Relaxed))
    }
}

/// A pointer loaded under a guard, valid for the guard's lifetime `'g`.
pub struct Shared<'g, T> {
    data: *mut T,
    _marker: PhantomData<(&'g Guard, *mut T)>,
}

impl<'g, T> Shared<'g, T> {
    /// Wraps a raw pointer.
    ///
    /// Creating a `Shared` is safe; dereferencing it is not.
    #[inline]
    pub fn from_raw(ptr: *mut T) -> Self {
        Self {
            data: ptr,
            _marker: PhantomData,
        }
    }

    /// The null pointer.
    #[inline]
    pub fn null() -> Self {
        Self::from_raw(ptr::null_mut())
    }

    /// Returns the raw pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.data
    }

    /// Returns true if the pointer is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Converts to an optional reference.
    ///
    /// # Safety
    ///
    /// The pointer must be null or point to a live `T` that was not retired
    /// before the guard was pinned.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&'g T> {
        unsafe { self.data.as_ref() }
    }

    /// Converts to a reference without checking for null.
    ///
    /// # Safety
    ///
    /// Same as [`Shared::as_ref`], and the pointer must be non-null.
    #[inline]
    pub unsafe fn deref(&self) -> &'g T {
        unsafe { &*self.data }
    }
}

impl<T> Clone for Shared<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shared<'_, T> {}

impl<T> PartialEq for Shared<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T> Eq for Shared<'_, T> {}

impl<T> core::fmt::Debug for Shared<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Shared({:p})", self.data)
    }
}
