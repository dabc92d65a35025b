//! Error types shared by the session and its plugins.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Recoverable errors raised by session operations.
///
/// Invariant violations (double registration, out-of-range indices, use of
/// a torn-down context) are not represented here; they panic.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sample rate outside the supported bounds.
    #[error("sample rate {value} is outside the supported range")]
    InvalidSampleRate { value: u32 },

    /// Channel count of zero.
    #[error("sample channel count cannot be 0")]
    InvalidChannelCount,

    /// MIDI attribute outside its valid range.
    #[error("invalid {field} value: {value}")]
    InvalidMidiData { field: &'static str, value: i64 },

    /// Non-MIDI zone property failed validation.
    #[error("invalid {field}: {message}")]
    InvalidZoneProperty {
        field: &'static str,
        message: String,
    },

    /// Participant id does not match the id grammar.
    #[error("'{id}' is not a valid participant id")]
    InvalidParticipantId { id: String },

    /// A sampler is already registered.
    #[error("a sampler is already registered")]
    SamplerAlreadyRegistered,

    /// Operation requires a loaded session.
    #[error("no session is loaded")]
    SessionNotLoaded,

    /// Operation requires that no session is loaded.
    #[error("a session is already loaded")]
    SessionAlreadyLoaded,

    /// Directory is not a session directory.
    #[error("'{path}' is not a session directory")]
    NotASession { path: PathBuf },

    /// A session already exists at the path.
    #[error("a session already exists at '{path}'")]
    SessionExists { path: PathBuf },

    /// The session file was written by an unsupported format version.
    #[error("unsupported session format version {version}")]
    UnsupportedVersion { version: u32 },

    /// Sample buffer whose length is not a multiple of its channel count.
    #[error("sample data of {len} values cannot be split into {channels} channels")]
    InvalidSampleData { len: usize, channels: u16 },

    /// Sample file name that is not a plain name inside the sample
    /// directory.
    #[error("'{file}' is not a valid sample file name")]
    InvalidSampleFile { file: String },

    /// I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Session document could not be encoded or decoded.
    #[error("session document error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check whether this is a validation failure the caller can fix by
    /// supplying different input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSampleRate { .. }
                | Self::InvalidChannelCount
                | Self::InvalidMidiData { .. }
                | Self::InvalidZoneProperty { .. }
                | Self::InvalidParticipantId { .. }
                | Self::SamplerAlreadyRegistered
        )
    }
}

/// Error raised by a plugin component (effect, sampler or target).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{component}: {message}")]
pub struct ComponentError {
    /// Display name of the component that failed.
    pub component: String,
    /// Human-readable message.
    pub message: String,
}

impl ComponentError {
    /// Create a new component error.
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}
