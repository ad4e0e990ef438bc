//! Logging setup on tracing-subscriber.
//!
//! `RUST_LOG` selects the filter (default `info`), e.g.
//! `RUST_LOG=nameplate_core=debug`.

use tracing_subscriber::{fmt, EnvFilter};

/// Log to stderr so JSON on stdout stays machine-readable.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Verbose logging captured by the test harness. Safe to call repeatedly.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
