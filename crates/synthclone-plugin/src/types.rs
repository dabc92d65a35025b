//! Core types for the plugin host.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use synthclone_session::{ParticipantInfo, SessionError};
use thiserror::Error;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur in the plugin host.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin id does not follow the participant id grammar.
    #[error("Invalid plugin id '{id}'")]
    InvalidId { id: String },

    /// A plugin with the same id is already registered.
    #[error("Plugin '{id}' is already registered")]
    AlreadyRegistered { id: String },

    /// Plugin is disabled in the host configuration.
    #[error("Plugin '{id}' is disabled")]
    Disabled { id: String },

    /// No plugin with this id is registered.
    #[error("Plugin '{id}' is not registered")]
    NotRegistered { id: String },

    /// The plugin's participant is not active.
    #[error("Plugin '{id}' is not active")]
    Inactive { id: String },

    /// A plugin setting is out of range.
    #[error("Invalid {setting}: {message}")]
    InvalidSetting {
        setting: &'static str,
        message: String,
    },

    /// Host configuration could not be read.
    #[error("Invalid host configuration at {path}: {message}")]
    ConfigError { path: PathBuf, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session rejected an operation.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl PluginError {
    pub(crate) fn setting(setting: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting,
            message: message.into(),
        }
    }
}

/// Descriptive information about a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Display name.
    pub name: String,

    /// Version as `major.minor.revision`.
    pub version: String,

    #[serde(default)]
    pub author: String,

    /// One-line description.
    #[serde(default)]
    pub summary: String,
}

impl From<&ParticipantInfo> for PluginMetadata {
    fn from(info: &ParticipantInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version(),
            author: info.author.clone(),
            summary: info.summary.clone(),
        }
    }
}
