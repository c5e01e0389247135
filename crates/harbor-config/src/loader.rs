//! TOML config file loading.
//!
//! Every key is optional and maps onto the matching [`ConfigBuilder`]
//! setter, so a file can be loaded first and refined in code afterwards:
//!
//! ```toml
//! base_dir = "/opt/harbor"
//! cache_dir = "/var/cache/harbor"
//! clear_cache = true
//! default_start_level = 60
//! modules = ["mvn:commons-lang/commons-lang/2.6"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, ConfigBuilder};

/// Maximum config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    etc_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    clear_cache: Option<bool>,
    default_start_level: Option<i32>,
    #[serde(default)]
    modules: Vec<String>,
}

impl ConfigFile {
    fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder {
            base_dir: self.base_dir,
            data_dir: self.data_dir,
            etc_dir: self.etc_dir,
            cache_dir: self.cache_dir,
            clear_cache: self.clear_cache.unwrap_or(false),
            default_start_level: self.default_start_level,
            modules: self.modules,
        }
    }
}

fn parse(content: &str, path: &str) -> ConfigResult<ConfigBuilder> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.to_owned(),
        source: e,
    })?;
    Ok(file.into_builder())
}

impl ConfigBuilder {
    /// Create a builder pre-populated from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] on malformed TOML or unknown keys.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        parse(content, "<inline>")
    }

    /// Create a builder pre-populated from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file cannot be read or is
    /// larger than 1 MiB, and [`ConfigError::ParseError`] on malformed TOML.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                        metadata.len()
                    ),
                ),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        let builder = parse(&content, &path.display().to_string())?;
        info!(path = %path.display(), "Loaded config file");
        Ok(builder)
    }
}

impl Config {
    /// Parse and finalize a TOML document.
    ///
    /// # Errors
    ///
    /// See [`ConfigBuilder::from_toml_str`] and [`ConfigBuilder::build`].
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        ConfigBuilder::from_toml_str(content)?.build()
    }

    /// Load and finalize a TOML file.
    ///
    /// # Errors
    ///
    /// See [`ConfigBuilder::from_file`] and [`ConfigBuilder::build`].
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        ConfigBuilder::from_file(path)?.build()
    }
}
