//! Tracing/logging setup shared by binaries and tests.

/// Initialize process-wide tracing with the default `info` filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with the filter used when `RUST_LOG` is unset
/// (usually `BillingConfig::log_level`).
pub fn init_with_default(default_filter: &str) {
    tracing::init(default_filter);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
