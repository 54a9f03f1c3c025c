//! Logging initialization for the command-line tool.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a stderr subscriber so stdout carries only tailed content.
///
/// `RUST_LOG` wins over `default_level` when it is set.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
