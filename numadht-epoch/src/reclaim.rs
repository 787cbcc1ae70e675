//! Reclamation instrumentation.

use crate::slot;

/// Process-wide reclamation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Current global epoch.
    pub epoch: u64,
    /// Pointers handed to `retire` since process start.
    pub retired: u64,
    /// Pointers whose destructor has run.
    pub reclaimed: u64,
}

impl Stats {
    /// Retired but not yet reclaimed, across all threads.
    pub fn pending(&self) -> u64 {
        self.retired.saturating_sub(self.reclaimed)
    }
}

/// Snapshot of the global counters.
///
/// The fields are read independently; under concurrent retirement the
/// snapshot is approximate.
pub fn stats() -> Stats {
    let global = slot::global();
    let reclaimed = global.reclaimed_total();
    Stats {
        epoch: global.epoch(),
        retired: global.retired_total().max(reclaimed),
        reclaimed,
    }
}

/// Current global epoch.
pub fn epoch() -> u64 {
    slot::global().epoch()
}
