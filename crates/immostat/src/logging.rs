//! Logging setup for the binary.

use tracing_subscriber::EnvFilter;

/// Takes precedence over `RUST_LOG`.
pub const LOG_ENV: &str = "IMMOSTAT_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber, writing to stderr so that command output
/// on stdout stays machine-readable. Does nothing if one is already set.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
