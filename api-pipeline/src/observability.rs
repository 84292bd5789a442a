//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Filter used when `service.log_level` is not a valid directive
const FALLBACK_FILTER: &str = "info";

/// Initialize JSON tracing output filtered by `service.log_level`
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(&config.service.log_level))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize tracing: {e}")))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Flush and report shutdown
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}
