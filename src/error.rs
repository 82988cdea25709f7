//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire application.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different failure sources: configuration loading, device calls, the MQTT
//! control channel, and request decoding.
//!
//! Note that per-capture failure modes (lock timeout, stream overflow, late command,
//! ...) are deliberately *not* errors: they are recovered locally by the acquisition
//! worker and reported as a [`crate::request::CaptureOutcome`]. `DaqError` covers the
//! conditions that bubble up to the top-level supervisor in `main`, which decides
//! whether to retry or shut down — nothing deep in the call graph terminates the
//! process on its own.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type Result<T> = std::result::Result<T, DaqError>;

/// Central application error type.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("MQTT transport error: {0}")]
    Transport(String),

    #[error("MQTT reconnect budget exhausted after {0} attempts")]
    TransportExhausted(u32),

    #[error("Operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_message_includes_detail() {
        let err = DaqError::Device("ref pll unlocked".to_string());
        assert_eq!(err.to_string(), "Device error: ref pll unlocked");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: DaqError = io.into();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
