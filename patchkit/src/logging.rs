//! Development-time tracing for debugging a run.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`; the durable
//! product output is the run report (`io::report`), which is written
//! regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. `RUST_LOG=patchkit=debug` also
/// dumps each converged decision tree.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
