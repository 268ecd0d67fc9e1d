use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// User preferences shared by every project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Start new connections in offline mode
    #[serde(default)]
    pub auto_offline: bool,

    /// How many times a query is retried after the user asks to re-enter credentials
    #[serde(default = "default_max_auth_retries")]
    pub max_auth_retries: u32,

    /// File name searched for by relative config parts
    #[serde(default = "default_relative_config_file_name")]
    pub relative_config_file_name: String,

    /// Name of the ignore pattern file looked up next to files
    #[serde(default = "default_ignore_file_name")]
    pub ignore_file_name: String,
}

fn default_max_auth_retries() -> u32 {
    3
}

fn default_relative_config_file_name() -> String {
    ".p4config".to_string()
}

fn default_ignore_file_name() -> String {
    ".p4ignore".to_string()
}

impl Default for UserPreferences {
    fn default() -> Self {
        UserPreferences {
            auto_offline: false,
            max_auth_retries: default_max_auth_retries(),
            relative_config_file_name: default_relative_config_file_name(),
            ignore_file_name: default_ignore_file_name(),
        }
    }
}

impl UserPreferences {
    /// Load preferences from the user config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&crate::config::ConfigManager::preferences_path()?)
    }

    /// Load preferences from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences: {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse preferences")
    }

    /// Save preferences to the user config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&crate::config::ConfigManager::preferences_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize preferences")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write preferences: {}", path.display()))?;

        Ok(())
    }
}
