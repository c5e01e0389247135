//! Configuration error types.

use thiserror::Error;

/// Errors raised while building or loading a [`Config`](crate::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config document is not valid TOML or has unknown keys.
    #[error("failed to parse config {path}: {source}")]
    ParseError {
        /// Path of the file, or `<inline>` for in-memory documents.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The default start level is below the lowest valid level.
    #[error("invalid default start level {0}: start levels begin at 1")]
    InvalidStartLevel(i32),

    /// A directory field resolved to an empty path.
    #[error("{field} must not be empty")]
    EmptyPath {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
