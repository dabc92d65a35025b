//! Host configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{PluginError, PluginResult};

/// Name of the configuration file inside the config directory.
pub const HOST_CONFIG_FILE: &str = "host.toml";

/// Host settings read from `host.toml` in the user config directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Ids of plugins that must not be registered.
    pub disabled_plugins: BTreeSet<String>,

    /// Default `tracing` filter for the command line tool.
    pub log_filter: Option<String>,
}

impl HostConfig {
    /// Directory holding the host configuration.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synthclone")
    }

    /// Read the configuration from the user config directory. A missing
    /// file yields the defaults.
    pub fn load() -> PluginResult<Self> {
        Self::load_from(&Self::config_dir().join(HOST_CONFIG_FILE))
    }

    /// Read the configuration from `path`. A missing file yields the
    /// defaults.
    pub fn load_from(path: &Path) -> PluginResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| PluginError::ConfigError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Disable a plugin.
    pub fn disable_plugin(mut self, id: impl Into<String>) -> Self {
        self.disabled_plugins.insert(id.into());
        self
    }

    /// Check if a plugin is disabled.
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled_plugins.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::load_from(&dir.path().join(HOST_CONFIG_FILE)).unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_load_disabled_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HOST_CONFIG_FILE);
        fs::write(
            &path,
            "disabled_plugins = [\"org.synthclone.plugins.trimmer\"]\nlog_filter = \"debug\"\n",
        )
        .unwrap();

        let config = HostConfig::load_from(&path).unwrap();
        assert!(config.is_disabled("org.synthclone.plugins.trimmer"));
        assert!(!config.is_disabled("org.synthclone.plugins.zonegenerator"));
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HOST_CONFIG_FILE);
        fs::write(&path, "disabled_plugins = 3").unwrap();
        assert!(matches!(
            HostConfig::load_from(&path),
            Err(PluginError::ConfigError { .. })
        ));
    }
}
