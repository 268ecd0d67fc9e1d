use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Name of the per-project storage directory
pub const PROJECT_STORAGE_DIR: &str = ".p4-workspace";

/// Cross-platform configuration directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the main configuration directory path following platform conventions:
    /// - Linux: $XDG_CONFIG_HOME/p4-workspace or ~/.config/p4-workspace
    /// - macOS: ~/Library/Application Support/p4-workspace
    /// - Windows: %APPDATA%\p4-workspace
    pub fn config_dir() -> Result<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join("p4-workspace"))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join("p4-workspace"))
            }
        }

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home
                .join("Library")
                .join("Application Support")
                .join("p4-workspace"))
        }

        #[cfg(target_os = "windows")]
        {
            Ok(dirs::config_dir()
                .context("Failed to get Windows config directory")?
                .join("p4-workspace"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(".p4-workspace"))
        }
    }

    /// Get the user preferences file path (config.toml)
    pub fn preferences_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("p4-workspace.log"))
    }

    /// Per-project storage directory, kept inside the project itself
    pub fn project_storage_dir(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_STORAGE_DIR)
    }

    /// The project's config part declarations (parts.toml)
    pub fn parts_file_path(project_root: &Path) -> PathBuf {
        Self::project_storage_dir(project_root).join("parts.toml")
    }

    /// Directory holding one cache file per client/server pair
    pub fn cache_dir(project_root: &Path) -> PathBuf {
        Self::project_storage_dir(project_root).join("cache")
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;
        Ok(config_dir)
    }

    /// Ensure the project cache directory exists
    pub fn ensure_cache_dir(project_root: &Path) -> Result<PathBuf> {
        let cache_dir = Self::cache_dir(project_root);
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;
        Ok(cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_paths() {
        let config_dir = ConfigManager::config_dir().unwrap();
        assert!(config_dir.to_string_lossy().contains("p4-workspace"));

        let prefs = ConfigManager::preferences_path().unwrap();
        assert!(prefs.to_string_lossy().ends_with("config.toml"));

        let log = ConfigManager::log_file_path().unwrap();
        assert!(log.to_string_lossy().contains("p4-workspace.log"));
    }

    #[test]
    fn test_project_paths() {
        let root = Path::new("/work/proj");
        assert_eq!(
            ConfigManager::parts_file_path(root),
            PathBuf::from("/work/proj/.p4-workspace/parts.toml")
        );
        assert_eq!(
            ConfigManager::cache_dir(root),
            PathBuf::from("/work/proj/.p4-workspace/cache")
        );
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_xdg_config_home_respected() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-xdg-config");
        let config_dir = ConfigManager::config_dir().unwrap();
        assert!(config_dir
            .to_string_lossy()
            .contains("/tmp/test-xdg-config/p4-workspace"));
        std::env::remove_var("XDG_CONFIG_HOME");
    }
}
