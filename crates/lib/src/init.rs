//! Create a starter route file so `cas serve` has something to load.

use anyhow::{Context, Result};
use std::path::Path;

static DEFAULT_ROUTES: &str = include_str!("../config/config.yml");

/// Write the bundled sample route file to `config_path` if it does not exist.
/// Creates the parent directory when needed. Returns true if a file was written.
pub fn init_config(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        log::info!("config already exists at {}, skipping", config_path.display());
        return Ok(false);
    }
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    std::fs::write(config_path, DEFAULT_ROUTES)
        .with_context(|| format!("writing default config to {}", config_path.display()))?;
    log::info!("created default config at {}", config_path.display());
    Ok(true)
}
