//! Request API.
//!
//! Every request that reaches the directory is followed by exactly one
//! [`numadht_epoch::advance`]. Allocation happens before a request enters
//! the directory, so an allocation failure has no epoch side effects.

use crate::config::Config;
use crate::directory::{Directory, Stats};
use crate::error::Result;
use crate::mode::{IntMode, Mode, VarMode};
use crate::prehash::{FoldPrehash, Prehash};
use crate::record::{Context, Status};

/// A concurrent key-value store in one operating mode.
///
/// ```rust
/// use numadht::IntDht;
///
/// let dht = IntDht::new();
/// dht.put(7, 700).unwrap();
/// assert_eq!(dht.get(7).unwrap().map(|c| c.value()), Some(700));
/// assert_eq!(dht.delete(7).unwrap().map(|c| c.value()), Some(700));
/// assert!(dht.get(7).unwrap().is_none());
/// ```
pub struct Dht<M: Mode, P: Prehash = FoldPrehash> {
    dir: Directory<M>,
    prehash: P,
}

/// Integer-key store.
pub type IntDht<P = FoldPrehash> = Dht<IntMode, P>;
/// Variable-length-key store.
pub type VarDht<P = FoldPrehash> = Dht<VarMode, P>;

impl<M: Mode> Dht<M> {
    /// Store with the default configuration.
    pub fn new() -> Self {
        // The default config builds a single bucket; only an allocator
        // abort can stop that.
        match Self::with_config(Config::default()) {
            Ok(dht) => dht,
            Err(err) => panic!("numadht: default directory allocation failed: {err}"),
        }
    }

    /// Store with `config`, hashing keys with foldhash seeded from it.
    pub fn with_config(config: Config) -> Result<Self> {
        let prehash = FoldPrehash::with_seed(config.seed);
        Self::with_prehash(config, prehash)
    }
}

impl<M: Mode> Default for Dht<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Mode, P: Prehash> Dht<M, P> {
    /// Store with an explicit prehash strategy; `config.seed` is unused.
    pub fn with_prehash(config: Config, prehash: P) -> Result<Self> {
        Ok(Self {
            dir: Directory::new(&config)?,
            prehash,
        })
    }

    #[inline]
    fn stamp(&self, ctx: &mut Context<M>) {
        ctx.signature = self.prehash.hash(ctx.key_bytes());
    }

    /// Look up the context's current key, filling its value on a hit.
    pub fn get_with_context(&self, ctx: &mut Context<M>) -> Status {
        self.stamp(ctx);
        let status = self.dir.get(ctx);
        numadht_epoch::advance();
        status
    }

    /// Delete the context's current key, loading the removed value into it.
    pub fn delete_with_context(&self, ctx: &mut Context<M>) -> Status {
        self.stamp(ctx);
        let status = self.dir.delete(ctx);
        numadht_epoch::advance();
        status
    }

    fn get_owned(&self, mut ctx: Context<M>) -> Option<Context<M>> {
        self.get_with_context(&mut ctx).is_found().then_some(ctx)
    }

    fn delete_owned(&self, mut ctx: Context<M>) -> Option<Context<M>> {
        self.delete_with_context(&mut ctx).is_found().then_some(ctx)
    }

    /// Live records.
    pub fn len(&self) -> usize {
        self.dir.len() as usize
    }

    /// No live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current directory depth: the table has `2^depth` slots.
    pub fn global_depth(&self) -> u32 {
        self.dir.depth()
    }

    /// Snapshot of the directory counters.
    pub fn stats(&self) -> Stats {
        self.dir.stats()
    }

    /// The prehash strategy in use.
    pub fn prehash(&self) -> &P {
        &self.prehash
    }
}

impl<P: Prehash> Dht<IntMode, P> {
    /// Insert or overwrite `key`.
    pub fn put(&self, key: u64, value: u64) -> Result<()> {
        let sig = self.prehash.hash(&key.to_ne_bytes());
        let rec = self.dir.store().int_record(sig, key, value)?;
        let res = self.dir.put(rec);
        numadht_epoch::advance();
        res
    }

    /// `Ok(None)` when `key` is absent.
    pub fn get(&self, key: u64) -> Result<Option<Context<IntMode>>> {
        Ok(self.get_owned(Context::new_int(key)))
    }

    /// Remove `key`, returning a context holding the removed value.
    pub fn delete(&self, key: u64) -> Result<Option<Context<IntMode>>> {
        Ok(self.delete_owned(Context::new_int(key)))
    }
}

impl<P: Prehash> Dht<VarMode, P> {
    /// Insert or overwrite `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let sig = self.prehash.hash(key);
        let rec = self.dir.store().var_record(sig, key, value)?;
        let res = self.dir.put(rec);
        numadht_epoch::advance();
        res
    }

    /// Look up `key`, copying at most `max_val_len` value bytes.
    pub fn get(&self, key: &[u8], max_val_len: usize) -> Result<Option<Context<VarMode>>> {
        debug_assert!(max_val_len > 0, "max_val_len must be positive");
        let ctx = Context::new_var(key, max_val_len)?;
        Ok(self.get_owned(ctx))
    }

    /// Remove `key`. The returned context has no value room; it reports the
    /// removed value's length only. Use [`Dht::delete_with_context`] with a
    /// roomy context to capture the bytes.
    pub fn delete(&self, key: &[u8]) -> Result<Option<Context<VarMode>>> {
        let ctx = Context::new_var(key, 0)?;
        Ok(self.delete_owned(ctx))
    }
}

impl<M: Mode, P: Prehash> core::fmt::Debug for Dht<M, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dht")
            .field("mode", &M::NAME)
            .field("len", &self.len())
            .field("depth", &self.global_depth())
            .finish_non_exhaustive()
    }
}
