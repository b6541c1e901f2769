use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gymchat_core::CoreConfig;

/// `<config_dir>/gymchat/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gymchat").join("config.json"))
}

/// Resolve the core config: an explicit path must load, the default path is
/// used only if present, otherwise built-in defaults apply.
pub fn resolve_config(explicit: Option<&Path>) -> Result<CoreConfig> {
    if let Some(path) = explicit {
        return CoreConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => CoreConfig::load(&path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        _ => Ok(CoreConfig::default()),
    }
}
