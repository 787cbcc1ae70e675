//! Shared test setup.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//! }
//! ```
//!
//! `RUST_LOG` filters output, e.g. `RUST_LOG=numadht=debug` together with
//! `--features tracing` to see splits and doublings.

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a compact console subscriber once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .with_target(true)
            .with_test_writer()
            .compact()
            .try_init();
    });
}

/// Flush the reclaimer until `done` holds. Other tests in the same binary
/// may keep a guard alive for a moment.
pub fn flush_until(done: impl Fn() -> bool) -> bool {
    for _ in 0..2_000 {
        numadht_epoch::flush();
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    done()
}
