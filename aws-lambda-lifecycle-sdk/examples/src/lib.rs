//! Shared utilities for AWS Lambda Lifecycle SDK examples

use tracing_subscriber::EnvFilter;

/// Re-export commonly used types from the SDK
pub use aws_lambda_lifecycle_sdk::*;

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Lambda captures stdout into the function's log stream, so no timestamps
/// or ANSI colors are written.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .with_ansi(false)
        .init();
}
