//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid level, directive or log target.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed.
    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
