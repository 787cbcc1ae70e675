//! numadht-epoch: quiescent-state epoch reclamation.
//!
//! A process-wide epoch counter plus one slot per registered thread. Readers
//! [`pin`] before touching shared pointers; writers [`retire`] what they
//! unlink; every completed request calls [`advance`], which periodically
//! moves the global epoch forward and frees retired memory that no pinned
//! thread can still reach.
//!
//! Reclamation never blocks. If some thread stays pinned, retired memory
//! simply accumulates until it unpins.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::Ordering;
//! use numadht_epoch::{Atomic, Shared, pin, retire, advance};
//!
//! let atomic = Atomic::from_box(Box::new(42u64));
//!
//! let guard = pin();
//! let old = atomic.load(Ordering::Acquire, &guard);
//! let new = Box::into_raw(Box::new(43u64));
//! atomic.store(Shared::from_raw(new), Ordering::Release);
//! unsafe { retire(old.as_raw()) };
//! drop(guard);
//!
//! advance();
//! # numadht_epoch::flush();
//! # unsafe { drop(Box::from_raw(new)) };
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod atomic;
mod guard;
mod reclaim;
mod retired;
mod slot;
mod ttas;

pub use atomic::{Atomic, Shared};
pub use guard::{Guard, advance, advances, flush, local_epoch, pending, pin, retire, retire_with};
pub use reclaim::{Stats, epoch, stats};
pub use retired::DestructorFn;
pub use slot::{ADVANCE_FREQ, MAX_THREADS, SWEEP_THRESHOLD};
pub use ttas::{TTas, TTasGuard};

pub use core::sync::atomic::Ordering;
