//! Tracing initialization.
//!
//! Structured logging via `tracing` / `tracing-subscriber`. The filter comes
//! from `RUST_LOG` when set, otherwise from the configured default level.

use crate::error::{DaqError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, early in `main`.
pub fn init(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| DaqError::Configuration(format!("invalid log filter: {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("tracing init failed: {e}")))?;
    Ok(())
}
