//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing with the format named by
/// `SAWIT_LOG_FORMAT` (`json`, the default, or `compact`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, formats).
pub mod tracing;
