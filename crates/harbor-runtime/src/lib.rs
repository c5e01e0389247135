//! Module and extension lifecycle controller for the Harbor runtime container.
//!
//! - [`Runtime`]: The controller. Owns both registries, prepares directories,
//!   creates the loader gateway and drives every state transition
//! - [`LoaderGateway`]: The external engine that loads, links and runs units
//! - [`Registry`]: Keyed record registry, one per [`Kind`]
//! - [`Record`] / [`RecordState`]: Snapshot of a module or extension
//! - [`ServiceRegistry`]: Type- and name-keyed capability lookup
//! - [`LifecycleReport`]: Per-record outcome of `start` and `stop`
//!
//! # Lifecycle
//!
//! ```text
//! INSTALLED -> RESOLVED -> STARTING -> ACTIVE -> STOPPING -> RESOLVED
//! any -> UNINSTALLED (record removed)
//! ```
//!
//! References (URLs, artifact coordinates, paths) are registry keys and are
//! otherwise opaque; the gateway decides how to load each shape.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod dirs;
pub mod error;
pub mod events;
pub mod gateway;
pub mod record;
pub mod reference;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod services;

pub use error::{RuntimeError, RuntimeResult};
pub use events::LifecycleEvent;
pub use gateway::{
    GatewayError, GatewayFactory, GatewayResult, LoadedUnit, LoaderGateway, UnitId,
};
pub use record::{ExtensionKind, Kind, ModuleKind, Record, RecordKind, RecordState, STATE_KEY};
pub use reference::ReferenceKind;
pub use registry::Registry;
pub use report::{LifecycleFailure, LifecycleReport, Stage};
pub use runtime::Runtime;
pub use services::ServiceRegistry;
