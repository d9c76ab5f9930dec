use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Resolve the data directory holding `uploads/` and `texts/`.
///
/// Priority:
/// 1. `STASH_DATA_DIR` environment variable
/// 2. Platform-specific app data dir (`~/.local/share/stash/`, etc.)
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STASH_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path).context("create STASH_DATA_DIR")?;
        return Ok(path);
    }

    let dirs = ProjectDirs::from("", "", "stash")
        .context("could not determine platform data directory")?;

    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}
