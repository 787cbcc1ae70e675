use thiserror::Error;

/// Errors returned by the request API.
///
/// A missing key is not an error: lookups and deletions report it through
/// `Ok(None)` or [`Status::NotFound`](crate::Status::NotFound).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhtError {
    /// A record or context buffer could not be reserved, or the configured
    /// record quota is spent.
    #[error("allocation failed for {what} ({bytes} bytes)")]
    Alloc {
        /// What was being allocated.
        what: &'static str,
        /// Size of the failed request, saturated at `usize::MAX`.
        bytes: usize,
    },
    /// The target bucket is full and already at the maximum local depth.
    #[error("directory exhausted: bucket full at maximum depth {depth}")]
    DirectoryExhausted {
        /// The configured maximum depth.
        depth: u32,
    },
}

impl DhtError {
    /// Both variants mean "the store could not take more memory".
    pub fn is_alloc_failure(&self) -> bool {
        matches!(
            self,
            DhtError::Alloc { .. } | DhtError::DirectoryExhausted { .. }
        )
    }
}

/// Result alias for fallible store operations.
pub type Result<T, E = DhtError> = core::result::Result<T, E>;
