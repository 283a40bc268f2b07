//! Tracing subscriber setup.
//!
//! Installed once by the binary. Library code only emits `tracing` events.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global `fmt` subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.effective_level()))
        .with_context(|| format!("Invalid log level: {}", config.effective_level()))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    Ok(())
}
