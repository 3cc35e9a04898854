//! Platform-specific paths.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use std::path::PathBuf;

/// Get the annex configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/annex` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\annex`
/// - **macOS**: `~/Library/Application Support/annex`
pub fn annex_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| RegistryError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(RegistryConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the persistent descriptor cache.
///
/// Returns `{annex_config_dir}/descriptors.sqlite`.
pub fn default_cache_db_path() -> Result<PathBuf> {
    Ok(annex_config_dir()?.join(RegistryConfig::CACHE_DB_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_db_path() {
        // Headless CI boxes may have no config dir at all.
        if let Ok(path) = default_cache_db_path() {
            assert!(path.ends_with("annex/descriptors.sqlite"));
        }
    }
}
