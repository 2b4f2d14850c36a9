//! Capability host configuration.

use std::path::PathBuf;

/// Default settings key for the selected override set.
pub const DEFAULT_SETTINGS_KEY: &str = "selected_resource_pack";

/// Configuration for the capability host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Settings key under which the selected override set id is stored
    pub settings_key: String,

    /// Settings file used by [`crate::JsonFileSettings`]
    pub settings_path: PathBuf,
}

impl HostConfig {
    /// Create a new configuration with the given settings file.
    pub fn new(settings_path: PathBuf) -> Self {
        Self {
            settings_key: DEFAULT_SETTINGS_KEY.to_string(),
            settings_path,
        }
    }

    /// Set the settings key.
    pub fn with_settings_key(mut self, key: impl Into<String>) -> Self {
        self.settings_key = key.into();
        self
    }

    /// Set the settings file path.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }

    /// Ensure the settings directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        // Use platform-appropriate default directories
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self::new(config_dir.join("capability-host").join("settings.json"))
    }
}
