//! Operating modes.
//!
//! A [`Mode`] fixes the layout of stored entries and of caller-owned
//! context buffers. The directory is generic over it; the request API adds
//! the mode-specific `put`/`get`/`delete` signatures.

/// Layout of one operating mode.
pub trait Mode: Sized + Send + Sync + 'static {
    /// Directory-owned key/value payload.
    type Entry: Send + Sync + 'static;
    /// Caller-owned key plus result region.
    type Buffer: Send;

    /// Short name for logs.
    const NAME: &'static str;

    /// Key bytes of a stored entry.
    fn entry_key(entry: &Self::Entry) -> &[u8];

    /// Key bytes a context is asking for.
    fn buffer_key(buf: &Self::Buffer) -> &[u8];

    /// Copy the value of `entry` into the result region of `buf`.
    fn load_value(entry: &Self::Entry, buf: &mut Self::Buffer);
}

/// Fixed 8-byte integer keys and values.
#[derive(Debug, Clone, Copy)]
pub struct IntMode;

/// Stored integer pair. The key is kept as its native-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntEntry {
    pub(crate) key: [u8; 8],
    pub(crate) value: u64,
}

impl IntEntry {
    /// Pair `key` with `value`.
    pub fn new(key: u64, value: u64) -> Self {
        Self {
            key: key.to_ne_bytes(),
            value,
        }
    }

    /// Stored key.
    pub fn key(&self) -> u64 {
        u64::from_ne_bytes(self.key)
    }

    /// Stored value.
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Integer context payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntBuffer {
    pub(crate) key: [u8; 8],
    pub(crate) value: u64,
}

impl Mode for IntMode {
    type Entry = IntEntry;
    type Buffer = IntBuffer;

    const NAME: &'static str = "int";

    #[inline]
    fn entry_key(entry: &IntEntry) -> &[u8] {
        &entry.key
    }

    #[inline]
    fn buffer_key(buf: &IntBuffer) -> &[u8] {
        &buf.key
    }

    #[inline]
    fn load_value(entry: &IntEntry, buf: &mut IntBuffer) {
        buf.value = entry.value;
    }
}

/// Variable-length byte keys and values.
#[derive(Debug, Clone, Copy)]
pub struct VarMode;

/// Stored key and value in one allocation: key bytes, then value bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct VarEntry {
    pub(crate) buf: Box<[u8]>,
    pub(crate) key_len: usize,
}

impl VarEntry {
    /// Key bytes, the front of the buffer.
    pub fn key(&self) -> &[u8] {
        &self.buf[..self.key_len]
    }

    /// Value bytes following the key.
    pub fn value(&self) -> &[u8] {
        &self.buf[self.key_len..]
    }
}

/// Variable-length context payload.
///
/// `value` has room for `max_val_len` bytes; `val_len` is the full length of
/// the last value loaded, which may exceed the room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarBuffer {
    pub(crate) key: Vec<u8>,
    pub(crate) value: Box<[u8]>,
    pub(crate) val_len: usize,
}

impl Mode for VarMode {
    type Entry = VarEntry;
    type Buffer = VarBuffer;

    const NAME: &'static str = "var";

    #[inline]
    fn entry_key(entry: &VarEntry) -> &[u8] {
        entry.key()
    }

    #[inline]
    fn buffer_key(buf: &VarBuffer) -> &[u8] {
        &buf.key
    }

    fn load_value(entry: &VarEntry, buf: &mut VarBuffer) {
        let value = entry.value();
        let n = value.len().min(buf.value.len());
        buf.value[..n].copy_from_slice(&value[..n]);
        buf.val_len = value.len();
    }
}
