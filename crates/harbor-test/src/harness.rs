//! Test harness helpers.

use harbor_config::{Config, ConfigBuilder};
use harbor_telemetry::{LogConfig, LogFormat, LogTarget, setup_logging};
use tempfile::TempDir;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::with_prefix("harbor-").expect("Failed to create temp directory")
}

/// Builder rooted at `dir`, for tests that need to tweak the config.
#[must_use]
pub fn test_config_builder(dir: &TempDir) -> ConfigBuilder {
    Config::builder().with_base_dir(dir.path())
}

/// Config rooted at `dir` with every other setting at its default.
///
/// # Panics
///
/// Panics if the config fails to build.
#[must_use]
pub fn test_config(dir: &TempDir) -> Config {
    test_config_builder(dir)
        .build()
        .expect("Failed to build test config")
}

/// Route logs through the test harness at `filter`. Only the first call in a
/// process takes effect.
pub fn setup_test_logging(filter: &str) {
    let config = LogConfig::new(filter)
        .with_format(LogFormat::Compact)
        .with_target(LogTarget::Test)
        .with_ansi(false)
        .without_timestamps();
    let _ = setup_logging(&config);
}

/// Set up test logging at `warn`.
pub fn init_test_logging() {
    setup_test_logging("warn");
}
