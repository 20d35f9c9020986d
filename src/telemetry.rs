//! Tracing setup.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's call. This helper covers the common case.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// the given directive. Safe to call more than once; later calls are no-ops.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));
    let _ = fmt().with_env_filter(filter).try_init();
}
