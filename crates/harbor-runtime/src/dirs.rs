//! Runtime directory preparation.
//!
//! ```text
//! {base}/
//! ├── data/    (runtime state owned by hosted code)
//! ├── etc/     (configuration files)
//! └── cache/   (loader cache; wiped on init when clear_cache is set)
//! ```
//!
//! Each directory may be relocated independently through the config.

use std::path::Path;

use harbor_config::Config;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};

/// Create every configured directory and, if requested, empty the cache.
///
/// # Errors
///
/// Returns [`RuntimeError::Directory`] naming the first directory that
/// could not be created or cleared.
pub async fn prepare(config: &Config) -> RuntimeResult<()> {
    for dir in [
        config.base_dir(),
        config.data_dir(),
        config.etc_dir(),
        config.cache_dir(),
    ] {
        create(dir).await?;
    }

    if config.clear_cache() {
        clear(config.cache_dir()).await?;
    }
    Ok(())
}

async fn create(dir: &Path) -> RuntimeResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| directory_error(dir, source))?;
    debug!(dir = %dir.display(), "Directory ready");
    Ok(())
}

/// Remove the contents of `dir`, keeping the directory itself.
async fn clear(dir: &Path) -> RuntimeResult<()> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|source| directory_error(dir, source))?;

    let mut removed: usize = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| directory_error(dir, source))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|source| directory_error(&path, source))?;
        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|source| directory_error(&path, source))?;
        removed = removed.saturating_add(1);
    }

    info!(dir = %dir.display(), removed, "Cleared cache");
    Ok(())
}

fn directory_error(path: &Path, source: std::io::Error) -> RuntimeError {
    RuntimeError::Directory {
        path: path.to_path_buf(),
        source,
    }
}
