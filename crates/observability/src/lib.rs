//! Process-wide logging setup shared by the shopdesk binaries.

/// Structured JSON logging, filtered by `RUST_LOG`.
pub mod logging;

/// Initialize logging with the `info` default filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init(logging::DEFAULT_FILTER);
}
