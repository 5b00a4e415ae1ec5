//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

pub mod replay;

/// Initialize tracing once per test binary (only first call succeeds)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sqlprobe=warn")
        .with_test_writer()
        .try_init();
}
