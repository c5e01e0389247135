//! Loader gateway contract.
//!
//! The gateway is the engine that actually fetches, wires and executes
//! units of code. The runtime only sees success or failure plus the
//! metadata a [`LoadedUnit`] carries; how reference strings of different
//! shapes are dispatched is entirely the gateway's business.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use harbor_config::Config;
use thiserror::Error;

/// Gateway-assigned identifier of a loaded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// A unit the gateway has fetched and installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedUnit {
    /// Gateway-assigned identifier.
    pub id: UnitId,
    /// Where the unit was loaded from (usually the reference itself).
    pub location: String,
    /// Symbolic name declared by the unit, if any.
    pub symbolic_name: Option<String>,
    /// Headers declared by the unit (version, vendor, ...).
    pub headers: BTreeMap<String, String>,
    /// Start level requested by the unit, if any.
    pub start_level: Option<i32>,
}

impl LoadedUnit {
    /// Create a unit with no name, headers or start level.
    #[must_use]
    pub fn new(id: UnitId, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
            symbolic_name: None,
            headers: BTreeMap::new(),
            start_level: None,
        }
    }

    /// Set the symbolic name.
    #[must_use]
    pub fn with_symbolic_name(mut self, name: impl Into<String>) -> Self {
        self.symbolic_name = Some(name.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Request a start level.
    #[must_use]
    pub fn with_start_level(mut self, level: i32) -> Self {
        self.start_level = Some(level);
        self
    }
}

/// Errors reported by a loader gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// A dependency of the unit could not be satisfied.
    #[error("unresolved dependency: {0}")]
    Unresolved(String),

    /// The unit's source could not be reached or read.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The fetched content is not a valid unit.
    #[error("invalid unit: {0}")]
    Invalid(String),

    /// The unit raised an error while starting or stopping.
    #[error("unit failed: {0}")]
    Failed(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Engine that loads, wires and runs units on behalf of the runtime.
///
/// Calls for a single registry are never concurrent: the runtime holds
/// that registry's lock for the duration of each call.
#[async_trait]
pub trait LoaderGateway: Send + Sync {
    /// Fetch and install the unit behind `reference`.
    async fn resolve(&self, reference: &str) -> GatewayResult<LoadedUnit>;

    /// Wire the unit's dependencies against the shared environment.
    async fn link(&self, _unit: &LoadedUnit) -> GatewayResult<()> {
        Ok(())
    }

    /// Start the unit.
    async fn activate(&self, unit: &LoadedUnit) -> GatewayResult<()>;

    /// Stop the unit.
    async fn deactivate(&self, unit: &LoadedUnit) -> GatewayResult<()>;

    /// Release everything the gateway holds for the unit.
    async fn uninstall(&self, _unit: &LoadedUnit) -> GatewayResult<()> {
        Ok(())
    }
}

/// Builds the gateway during [`Runtime::init`](crate::Runtime::init), once
/// the configured directories exist.
pub trait GatewayFactory: Send + Sync {
    /// Create a gateway bound to the directories in `config`.
    ///
    /// # Errors
    ///
    /// Any error aborts runtime initialization.
    fn create(&self, config: &Config) -> GatewayResult<Arc<dyn LoaderGateway>>;
}

impl<F> GatewayFactory for F
where
    F: Fn(&Config) -> GatewayResult<Arc<dyn LoaderGateway>> + Send + Sync,
{
    fn create(&self, config: &Config) -> GatewayResult<Arc<dyn LoaderGateway>> {
        self(config)
    }
}
