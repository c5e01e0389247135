//! Harbor Telemetry - logging setup for the Harbor module runtime.
//!
//! The runtime itself only emits `tracing` events; embedders choose where
//! they go by installing a subscriber, usually through [`setup_logging`].
//!
//! # Example
//!
//! ```rust,no_run
//! use harbor_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), harbor_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("harbor_runtime=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("runtime starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
