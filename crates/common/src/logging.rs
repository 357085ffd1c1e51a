//! Logging utilities for the dpvs administration crates.
//!
//! Output goes to stderr so tables rendered on stdout stay parseable.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing with sensible defaults.
///
/// Uses the RUST_LOG environment variable to control log levels.
/// Default level is WARN.
pub fn init() {
    init_with("warn", false);
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json() {
    init_with("warn", true);
}

/// Initialize tracing with an explicit fallback level.
///
/// RUST_LOG still wins when it is set.
pub fn init_with(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}
