//! Runtime error types.

use std::path::PathBuf;

use crate::gateway::GatewayError;
use crate::record::Kind;
use crate::report::Stage;

/// Errors from runtime operations.
///
/// Every variant raised for a single module or extension carries the
/// reference it was added with.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A configured directory could not be created or cleared.
    #[error("failed to prepare directory {path}: {source}")]
    Directory {
        /// The directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The gateway factory failed during init.
    #[error("loader gateway failed to initialize: {0}")]
    GatewayInit(#[source] GatewayError),

    /// The gateway could not load a reference; nothing was recorded.
    #[error("failed to load {kind} {reference}: {source}")]
    LoadFailure {
        /// Registry the reference was added to.
        kind: Kind,
        /// The reference.
        reference: String,
        /// Gateway error.
        source: GatewayError,
    },

    /// An installed record could not be resolved or activated.
    #[error("failed to {stage} {kind} {reference}: {source}")]
    ResolutionFailure {
        /// Registry of the record.
        kind: Kind,
        /// The record's reference.
        reference: String,
        /// Step that failed.
        stage: Stage,
        /// Gateway error.
        source: GatewayError,
    },

    /// An active record could not be stopped.
    #[error("failed to stop {kind} {reference}: {source}")]
    StopFailure {
        /// Registry of the record.
        kind: Kind,
        /// The record's reference.
        reference: String,
        /// Gateway error.
        source: GatewayError,
    },

    /// The gateway refused to release a record's unit.
    #[error("failed to uninstall {kind} {reference}: {source}")]
    UninstallFailure {
        /// Registry of the record.
        kind: Kind,
        /// The record's reference.
        reference: String,
        /// Gateway error.
        source: GatewayError,
    },

    /// No service is registered under the requested key.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// `init` has not completed on this instance, or no instance is current.
    #[error("runtime is not initialized")]
    NotInitialized,

    /// `init` was already called on this instance.
    #[error("runtime is already initialized")]
    AlreadyInitialized,

    /// `init` failed earlier; the instance is unusable.
    #[error("runtime initialization failed; instance is unusable")]
    InitFailed,
}

impl RuntimeError {
    /// The module or extension reference this error concerns, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::LoadFailure { reference, .. }
            | Self::ResolutionFailure { reference, .. }
            | Self::StopFailure { reference, .. }
            | Self::UninstallFailure { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
