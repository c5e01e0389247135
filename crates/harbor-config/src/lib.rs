//! Configuration for the Harbor module runtime.
//!
//! A [`Config`] is assembled with a [`ConfigBuilder`] (optionally seeded from
//! a TOML file) and handed to the runtime, which treats it as immutable.
//!
//! ```rust,no_run
//! use harbor_config::Config;
//!
//! let config = Config::builder()
//!     .with_base_dir("target/harbor")
//!     .with_cache_dir("target/harbor/cache/1")
//!     .with_clear_cache(true)
//!     .build()
//!     .unwrap();
//! assert!(config.clear_cache());
//! ```
//!
//! # Directory layout
//!
//! Unless set explicitly, directories derive from the base directory:
//! `{base}/data`, `{base}/etc` and `{base}/cache`. The base directory itself
//! defaults to `$HARBOR_HOME` or `{temp_dir}/harbor`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

/// Environment fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// TOML config file loading.
pub mod loader;
pub mod published;
/// Configuration value and builder.
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{Config, ConfigBuilder, DEFAULT_START_LEVEL, MIN_START_LEVEL};
