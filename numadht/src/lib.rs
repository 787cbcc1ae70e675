//! NUMA-aware concurrent key-value store.
//!
//! numadht is an extendible-hash directory whose buckets split lazily, one
//! overflowing bucket at a time, onto the NUMA node chosen by a
//! [`Placement`] policy. Lookups take no locks; mutators lock a single
//! bucket; memory unlinked by overwrites, deletions, splits and directory
//! doublings is reclaimed through the `numadht-epoch` quiescent-state
//! scheme.
//!
//! Two operating modes share the directory:
//!
//! - [`IntDht`]: 8-byte integer keys and values
//! - [`VarDht`]: byte-string keys and values of any length
//!
//! Each has one-shot calls (`put`, `get`, `delete`) and context-reuse calls
//! (`get_with_context`, `delete_with_context`) that borrow a caller-owned
//! [`Context`] and re-stamp its signature on every submission.
//!
//! # Example
//!
//! ```rust
//! use numadht::{Config, Context, Status, VarDht};
//!
//! let dht = VarDht::with_config(Config::new().bucket_capacity(4)).unwrap();
//! dht.put(b"apple", b"red").unwrap();
//! dht.put(b"banana", b"yellow").unwrap();
//!
//! let hit = dht.get(b"apple", 16).unwrap().unwrap();
//! assert_eq!(hit.value(), b"red");
//!
//! let mut ctx = Context::new_var(b"banana", 16).unwrap();
//! assert_eq!(dht.get_with_context(&mut ctx), Status::Found);
//! assert_eq!(ctx.value(), b"yellow");
//!
//! ctx.set_key(b"cherry").unwrap();
//! assert_eq!(dht.get_with_context(&mut ctx), Status::NotFound);
//! ```
//!
//! # Errors
//!
//! A missing key is never an error. [`DhtError`] only reports allocation
//! failure: a buffer that could not be reserved, a spent record quota, or a
//! bucket that cannot split any further.

#![warn(missing_docs)]

mod tracing_helpers;

mod bucket;
pub mod config;
mod dht;
mod directory;
mod error;
pub mod mode;
pub mod numa;
pub mod prehash;
mod record;

pub use config::Config;
pub use dht::{Dht, IntDht, VarDht};
pub use directory::Stats;
pub use error::{DhtError, Result};
pub use mode::{IntMode, Mode, VarMode};
pub use numa::Placement;
pub use prehash::{FoldPrehash, IdentityPrehash, Prehash};
pub use record::{Context, IntContext, Status, VarContext};
