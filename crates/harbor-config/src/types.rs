use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::published;

/// Start level given to modules that do not report one.
pub const DEFAULT_START_LEVEL: i32 = 50;

/// Lowest valid start level.
pub const MIN_START_LEVEL: i32 = 1;

/// Finalized runtime configuration.
///
/// Produced by [`ConfigBuilder::build`] and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    base_dir: PathBuf,
    data_dir: PathBuf,
    etc_dir: PathBuf,
    cache_dir: PathBuf,
    clear_cache: bool,
    default_start_level: i32,
    modules: Vec<String>,
}

impl Config {
    /// Start a new builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Base directory every other directory derives from by default.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Data directory (`{base}/data` unless overridden).
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Config directory (`{base}/etc` unless overridden).
    #[must_use]
    pub fn etc_dir(&self) -> &Path {
        &self.etc_dir
    }

    /// Cache directory (`{base}/cache` unless overridden).
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Whether the cache directory is wiped during runtime init.
    #[must_use]
    pub fn clear_cache(&self) -> bool {
        self.clear_cache
    }

    /// Start level for records whose unit does not report one.
    #[must_use]
    pub fn default_start_level(&self) -> i32 {
        self.default_start_level
    }

    /// Module references installed on first start.
    #[must_use]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }
}

/// Fluent builder for [`Config`].
///
/// Directory derivation happens once, in [`build`](Self::build): any of
/// `data_dir`, `etc_dir` and `cache_dir` that was set explicitly is kept
/// as given, the rest are derived from the base directory. Call order
/// does not matter.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    pub(crate) base_dir: Option<PathBuf>,
    pub(crate) data_dir: Option<PathBuf>,
    pub(crate) etc_dir: Option<PathBuf>,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) clear_cache: bool,
    pub(crate) default_start_level: Option<i32>,
    pub(crate) modules: Vec<String>,
}

impl ConfigBuilder {
    /// Create a builder with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Override the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Override the config directory.
    #[must_use]
    pub fn with_etc_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.etc_dir = Some(dir.into());
        self
    }

    /// Override the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Wipe the cache directory during init.
    #[must_use]
    pub fn with_clear_cache(mut self, clear: bool) -> Self {
        self.clear_cache = clear;
        self
    }

    /// Set the default start level.
    #[must_use]
    pub fn with_default_start_level(mut self, level: i32) -> Self {
        self.default_start_level = Some(level);
        self
    }

    /// Append an initial module reference.
    #[must_use]
    pub fn with_module(mut self, reference: impl Into<String>) -> Self {
        self.modules.push(reference.into());
        self
    }

    /// Append several initial module references.
    #[must_use]
    pub fn with_modules<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(references.into_iter().map(Into::into));
        self
    }

    /// Finalize the configuration and publish its data and config
    /// directories (see [`published`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStartLevel`] if the default start level
    /// is below [`MIN_START_LEVEL`], or [`ConfigError::EmptyPath`] if a
    /// directory resolves to an empty path.
    pub fn build(self) -> ConfigResult<Config> {
        let base_dir = self.base_dir.unwrap_or_else(crate::env::default_base_dir);
        let data_dir = self.data_dir.unwrap_or_else(|| base_dir.join("data"));
        let etc_dir = self.etc_dir.unwrap_or_else(|| base_dir.join("etc"));
        let cache_dir = self.cache_dir.unwrap_or_else(|| base_dir.join("cache"));

        for (field, path) in [
            ("base_dir", &base_dir),
            ("data_dir", &data_dir),
            ("etc_dir", &etc_dir),
            ("cache_dir", &cache_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyPath { field });
            }
        }

        let default_start_level = self.default_start_level.unwrap_or(DEFAULT_START_LEVEL);
        if default_start_level < MIN_START_LEVEL {
            return Err(ConfigError::InvalidStartLevel(default_start_level));
        }

        published::publish(published::DATA_DIR, data_dir.display().to_string());
        published::publish(published::ETC_DIR, etc_dir.display().to_string());
        debug!(
            base_dir = %base_dir.display(),
            cache_dir = %cache_dir.display(),
            "Configuration finalized"
        );

        Ok(Config {
            base_dir,
            data_dir,
            etc_dir,
            cache_dir,
            clear_cache: self.clear_cache,
            default_start_level,
            modules: self.modules,
        })
    }
}
