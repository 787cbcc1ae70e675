//! Records, contexts and the record store.

use crate::error::{DhtError, Result};
use crate::mode::{IntBuffer, IntEntry, IntMode, Mode, VarBuffer, VarEntry, VarMode};
use crate::numa::Placer;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;

/// A directory-owned key/value entry. Immutable once installed.
pub struct Record<M: Mode> {
    pub(crate) signature: u64,
    pub(crate) entry: M::Entry,
}

impl<M: Mode> Record<M> {
    pub(crate) fn new(signature: u64, entry: M::Entry) -> Self {
        Self { signature, entry }
    }

    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        M::entry_key(&self.entry)
    }

    #[inline]
    pub(crate) fn matches(&self, signature: u64, key: &[u8]) -> bool {
        self.signature == signature && self.key() == key
    }
}

/// Outcome of a context-reuse lookup or deletion.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The key was present; the context holds its value.
    Found,
    /// The key was absent; the context is untouched.
    NotFound,
}

impl Status {
    /// `true` for [`Status::Found`].
    pub fn is_found(self) -> bool {
        self == Status::Found
    }
}

/// A caller-owned request: key, cached signature and result region.
///
/// One-shot `get`/`delete` hand a populated context back; the
/// `*_with_context` calls borrow one, re-stamp its signature from the
/// current key and fill its result region on a hit.
pub struct Context<M: Mode> {
    pub(crate) signature: u64,
    pub(crate) buf: M::Buffer,
}

/// Integer-mode context.
pub type IntContext = Context<IntMode>;
/// Variable-length-mode context.
pub type VarContext = Context<VarMode>;

impl<M: Mode> Context<M> {
    /// Signature stamped by the last submission.
    pub fn signature(&self) -> u64 {
        self.signature
    }

    #[inline]
    pub(crate) fn key_bytes(&self) -> &[u8] {
        M::buffer_key(&self.buf)
    }
}

impl Context<IntMode> {
    /// Context for `key` with a zeroed value.
    pub fn new_int(key: u64) -> Self {
        Self {
            signature: 0,
            buf: IntBuffer {
                key: key.to_ne_bytes(),
                value: 0,
            },
        }
    }

    /// Current key.
    pub fn key(&self) -> u64 {
        u64::from_ne_bytes(self.buf.key)
    }

    /// Point the context at another key; the value region is left as is.
    pub fn set_key(&mut self, key: u64) {
        self.buf.key = key.to_ne_bytes();
    }

    /// Value loaded by the last successful get or delete.
    pub fn value(&self) -> u64 {
        self.buf.value
    }
}

impl Context<VarMode> {
    /// Allocate a context for `key` with room for `max_val_len` value bytes.
    ///
    /// Lookups with `max_val_len == 0` only report presence and length.
    pub fn new_var(key: &[u8], max_val_len: usize) -> Result<Self> {
        let mut k = Vec::new();
        k.try_reserve_exact(key.len()).map_err(|_| DhtError::Alloc {
            what: "context key",
            bytes: key.len(),
        })?;
        k.extend_from_slice(key);

        let mut value = Vec::new();
        value
            .try_reserve_exact(max_val_len)
            .map_err(|_| DhtError::Alloc {
                what: "context value",
                bytes: max_val_len,
            })?;
        value.resize(max_val_len, 0);

        Ok(Self {
            signature: 0,
            buf: VarBuffer {
                key: k,
                value: value.into_boxed_slice(),
                val_len: 0,
            },
        })
    }

    /// Current key.
    pub fn key(&self) -> &[u8] {
        &self.buf.key
    }

    /// Replace the key, reusing the key buffer when it is large enough.
    pub fn set_key(&mut self, key: &[u8]) -> Result<()> {
        self.buf.key.clear();
        self.buf
            .key
            .try_reserve(key.len())
            .map_err(|_| DhtError::Alloc {
                what: "context key",
                bytes: key.len(),
            })?;
        self.buf.key.extend_from_slice(key);
        Ok(())
    }

    /// Value bytes loaded by the last hit, cut at `max_val_len`.
    pub fn value(&self) -> &[u8] {
        &self.buf.value[..self.buf.val_len.min(self.buf.value.len())]
    }

    /// Full length of the stored value seen by the last hit.
    pub fn value_len(&self) -> usize {
        self.buf.val_len
    }

    /// Room in the result region.
    pub fn max_val_len(&self) -> usize {
        self.buf.value.len()
    }

    /// The last value did not fit in the result region.
    pub fn is_truncated(&self) -> bool {
        self.buf.val_len > self.buf.value.len()
    }
}

impl core::fmt::Debug for Context<IntMode> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IntContext")
            .field("key", &self.key())
            .field("value", &self.value())
            .field("signature", &format_args!("{:#018x}", self.signature))
            .finish()
    }
}

impl core::fmt::Debug for Context<VarMode> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VarContext")
            .field("key_len", &self.buf.key.len())
            .field("val_len", &self.buf.val_len)
            .field("max_val_len", &self.max_val_len())
            .field("signature", &format_args!("{:#018x}", self.signature))
            .finish()
    }
}

/// Record allocation with an optional live-record quota.
pub(crate) struct RecordStore {
    quota: Option<u64>,
    live: AtomicU64,
    placer: Placer,
}

impl RecordStore {
    pub(crate) fn new(quota: Option<u64>, placer: Placer) -> Self {
        Self {
            quota,
            live: AtomicU64::new(0),
            placer,
        }
    }

    /// Claim one record against the quota.
    fn reserve(&self, bytes: usize) -> Result<()> {
        let Some(quota) = self.quota else {
            self.live.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < quota).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| DhtError::Alloc {
                what: "record",
                bytes,
            })
    }

    /// Return a record's claim: on retirement, or when a put fails.
    pub(crate) fn release(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    /// Records currently claimed.
    pub(crate) fn live(&self) -> u64 {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn int_record(
        &self,
        signature: u64,
        key: u64,
        value: u64,
    ) -> Result<Box<Record<IntMode>>> {
        self.reserve(core::mem::size_of::<Record<IntMode>>())?;
        Ok(Box::new(Record::new(signature, IntEntry::new(key, value))))
    }

    pub(crate) fn var_record(
        &self,
        signature: u64,
        key: &[u8],
        value: &[u8],
    ) -> Result<Box<Record<VarMode>>> {
        let bytes = key.len() + value.len();
        self.reserve(core::mem::size_of::<Record<VarMode>>() + bytes)?;

        let mut buf = Vec::new();
        if buf.try_reserve_exact(bytes).is_err() {
            self.release();
            return Err(DhtError::Alloc {
                what: "record buffer",
                bytes,
            });
        }
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
        let buf = buf.into_boxed_slice();
        self.placer
            .bind(buf.as_ptr(), buf.len(), self.placer.record_node(signature));

        Ok(Box::new(Record::new(
            signature,
            VarEntry {
                buf,
                key_len: key.len(),
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numa::Placement;

    fn store(quota: Option<u64>) -> RecordStore {
        RecordStore::new(quota, Placer::new(Placement::Single, false))
    }

    #[test]
    fn quota_limits_live_records() {
        let store = store(Some(2));
        let a = store.int_record(1, 1, 10).unwrap();
        let _b = store.int_record(2, 2, 20).unwrap();
        let err = store.int_record(3, 3, 30).err().unwrap();
        assert!(err.is_alloc_failure());
        assert_eq!(store.live(), 2);

        drop(a);
        store.release();
        assert!(store.int_record(3, 3, 30).is_ok());
    }

    #[test]
    fn var_record_layout() {
        let store = store(None);
        let rec = store.var_record(7, b"key", b"value").unwrap();
        assert_eq!(rec.key(), b"key");
        assert_eq!(rec.entry.value(), b"value");
        assert!(rec.matches(7, b"key"));
        assert!(!rec.matches(8, b"key"));
        assert!(!rec.matches(7, b"kez"));
    }

    #[test]
    fn var_context_truncates_into_its_room() {
        let store = store(None);
        let rec = store.var_record(1, b"k", b"0123456789").unwrap();
        let mut ctx = Context::new_var(b"k", 4).unwrap();
        VarMode::load_value(&rec.entry, &mut ctx.buf);
        assert_eq!(ctx.value(), b"0123");
        assert_eq!(ctx.value_len(), 10);
        assert!(ctx.is_truncated());

        let mut roomy = Context::new_var(b"k", 32).unwrap();
        VarMode::load_value(&rec.entry, &mut roomy.buf);
        assert_eq!(roomy.value(), b"0123456789");
        assert!(!roomy.is_truncated());
    }

    #[test]
    fn huge_context_is_an_alloc_error() {
        let err = Context::new_var(b"k", usize::MAX).unwrap_err();
        assert!(matches!(err, DhtError::Alloc { what: "context value", .. }));
    }

    #[test]
    fn int_context_keys() {
        let mut ctx = Context::new_int(5);
        assert_eq!(ctx.key(), 5);
        ctx.set_key(9);
        assert_eq!(ctx.key(), 9);
        assert_eq!(ctx.key_bytes(), &9u64.to_ne_bytes());
    }
}
