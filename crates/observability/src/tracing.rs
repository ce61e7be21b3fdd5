//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

/// JSON logs with timestamps, filtered by `RUST_LOG` or `default_filter`.
///
/// An unparsable `default_filter` falls back to `info`.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
