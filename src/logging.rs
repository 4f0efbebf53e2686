//! Tracing subscriber setup for binaries and tests embedding the runtime.

use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when the variable is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
