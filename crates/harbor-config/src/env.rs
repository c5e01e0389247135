use std::path::PathBuf;

use tracing::warn;

/// Environment variable naming the base directory.
pub const HARBOR_HOME: &str = "HARBOR_HOME";

/// Resolve the base directory used when none is configured.
///
/// Checks `$HARBOR_HOME` first, then falls back to `{temp_dir}/harbor`.
/// A relative `$HARBOR_HOME` is ignored.
#[must_use]
pub fn default_base_dir() -> PathBuf {
    match std::env::var_os(HARBOR_HOME) {
        Some(custom) if !custom.is_empty() => {
            let path = PathBuf::from(custom);
            if path.is_absolute() {
                return path;
            }
            warn!(path = %path.display(), "HARBOR_HOME must be an absolute path; ignoring");
        },
        _ => {},
    }
    std::env::temp_dir().join("harbor")
}
