//! Telemetry initialisation for the CLI.
//!
//! Structured JSON logs only, written to stderr so that stdout carries nothing
//! but operation output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialise the tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `log_level`.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive or the
/// subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow::anyhow!("invalid log level {log_level:?}: {e}"))?,
    };

    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise akm-cli tracing subscriber: {e}"))
}
