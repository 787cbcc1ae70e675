//! Store configuration.
//!
//! ```rust
//! use numadht::{Config, Placement};
//!
//! let config = Config::new()
//!     .bucket_capacity(16)
//!     .initial_depth(4)
//!     .placement(Placement::HashRange);
//! assert_eq!(config.get_bucket_capacity(), 16);
//! ```

use crate::numa::Placement;
use crate::prehash::DEFAULT_SEED;
use crate::tracing_helpers::warn_log;
use std::env;

/// Default slots per bucket.
pub const DEFAULT_BUCKET_CAPACITY: usize = 8;
/// Default limit on local (and so global) depth.
pub const DEFAULT_MAX_DEPTH: u32 = 32;
/// Hard limit on depth. A table of `2^depth` slots must stay addressable.
pub const MAX_DEPTH_LIMIT: u32 = if usize::BITS - 1 < 48 {
    usize::BITS - 1
} else {
    48
};

/// Directory and store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) bucket_capacity: usize,
    pub(crate) initial_depth: u32,
    pub(crate) max_depth: u32,
    pub(crate) placement: Placement,
    pub(crate) bind_memory: bool,
    pub(crate) record_quota: Option<u64>,
    pub(crate) seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            initial_depth: 0,
            max_depth: DEFAULT_MAX_DEPTH.min(MAX_DEPTH_LIMIT),
            placement: Placement::Local,
            bind_memory: false,
            record_quota: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl Config {
    /// Same as [`Config::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `NUMADHT_PLACEMENT`, `NUMADHT_BIND`,
    /// `NUMADHT_BUCKET_CAPACITY` and `NUMADHT_QUOTA`.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| env::var(name).ok())
    }

    fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("NUMADHT_PLACEMENT") {
            match v.parse() {
                Ok(p) => self = self.placement(p),
                Err(_e) => {
                    warn_log!(value = %v, error = %_e, "ignoring NUMADHT_PLACEMENT");
                }
            }
        }
        if let Some(v) = var("NUMADHT_BIND") {
            self = self.bind_memory(matches!(v.trim(), "1" | "true" | "yes" | "on"));
        }
        if let Some(n) = var("NUMADHT_BUCKET_CAPACITY").and_then(|v| v.trim().parse().ok()) {
            self = self.bucket_capacity(n);
        }
        if let Some(n) = var("NUMADHT_QUOTA").and_then(|v| v.trim().parse().ok()) {
            self = self.record_quota(Some(n));
        }
        self
    }

    /// Slots per bucket; at least 1.
    pub fn bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity.max(1);
        self
    }

    /// Global depth at creation: `2^depth` buckets are built up front.
    /// Capped at `max_depth`.
    pub fn initial_depth(mut self, depth: u32) -> Self {
        self.initial_depth = depth.min(self.max_depth);
        self
    }

    /// Deepest a bucket may split to. Capped at [`MAX_DEPTH_LIMIT`].
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth.min(MAX_DEPTH_LIMIT);
        self.initial_depth = self.initial_depth.min(self.max_depth);
        self
    }

    /// How buckets are assigned to NUMA nodes.
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Back bucket slot arrays and variable-length record buffers with
    /// memory preferred on their node (`mbind`, Linux only).
    pub fn bind_memory(mut self, bind: bool) -> Self {
        self.bind_memory = bind;
        self
    }

    /// Cap on live records; puts of new records beyond it fail with
    /// [`DhtError::Alloc`](crate::DhtError::Alloc).
    pub fn record_quota(mut self, quota: Option<u64>) -> Self {
        self.record_quota = quota;
        self
    }

    /// Prehash seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Slots per bucket.
    pub fn get_bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    /// Global depth at creation.
    pub fn get_initial_depth(&self) -> u32 {
        self.initial_depth
    }

    /// Deepest a bucket may split to.
    pub fn get_max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Bucket placement policy.
    pub fn get_placement(&self) -> Placement {
        self.placement
    }

    /// Whether allocations are bound to their node.
    pub fn get_bind_memory(&self) -> bool {
        self.bind_memory
    }

    /// Live record cap, if any.
    pub fn get_record_quota(&self) -> Option<u64> {
        self.record_quota
    }

    /// Prehash seed.
    pub fn get_seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.get_bucket_capacity(), 8);
        assert_eq!(c.get_initial_depth(), 0);
        assert_eq!(c.get_max_depth(), DEFAULT_MAX_DEPTH.min(MAX_DEPTH_LIMIT));
        assert_eq!(c.get_placement(), Placement::Local);
        assert!(!c.get_bind_memory());
        assert_eq!(c.get_record_quota(), None);
        assert_eq!(c.get_seed(), 0);
    }

    #[test]
    fn builder_clamps() {
        let c = Config::new().bucket_capacity(0).max_depth(99).initial_depth(60);
        assert_eq!(c.get_bucket_capacity(), 1);
        assert_eq!(c.get_max_depth(), MAX_DEPTH_LIMIT);
        assert_eq!(c.get_initial_depth(), MAX_DEPTH_LIMIT);

        let c = Config::new().initial_depth(10).max_depth(4);
        assert_eq!(c.get_initial_depth(), 4);
    }

    #[test]
    fn depth_limit_fits_usize() {
        assert!(MAX_DEPTH_LIMIT < usize::BITS);
        assert!(1usize.checked_shl(MAX_DEPTH_LIMIT).is_some());
        assert!(Config::new().max_depth(u32::MAX).get_max_depth() < usize::BITS);
    }

    #[test]
    fn env_overlay() {
        let c = Config::default().overlay(env_of(&[
            ("NUMADHT_PLACEMENT", "hash-range"),
            ("NUMADHT_BIND", "1"),
            ("NUMADHT_BUCKET_CAPACITY", "32"),
            ("NUMADHT_QUOTA", "1000"),
        ]));
        assert_eq!(c.get_placement(), Placement::HashRange);
        assert!(c.get_bind_memory());
        assert_eq!(c.get_bucket_capacity(), 32);
        assert_eq!(c.get_record_quota(), Some(1000));
    }

    #[test]
    fn env_overlay_ignores_garbage() {
        let c = Config::default().overlay(env_of(&[
            ("NUMADHT_PLACEMENT", "sideways"),
            ("NUMADHT_BUCKET_CAPACITY", "many"),
        ]));
        assert_eq!(c, Config::default());
    }
}
