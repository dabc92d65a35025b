//! Core types for synthclone.
//!
//! This crate provides the value types shared by the session authority, the
//! plugin facade and the plugins themselves: participant identifiers, typed
//! object handles, zones, sample buffers, session configuration and the
//! on-disk session document.

mod config;
mod document;
mod error;
mod handle;
mod id;
mod sample;
mod visibility;
mod zone;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use document::{
    ComponentRecord, ParticipantRecord, SAMPLE_DIRECTORY_NAME, SAMPLE_STAGING_DIRECTORY_NAME,
    SESSION_FILE_NAME, SESSION_FORMAT_VERSION, SampleRecord, SessionDocument, ZoneRecord,
};
pub use error::{ComponentError, SessionError, SessionResult};
pub use handle::{
    EffectId, HandleAllocator, JobId, MenuActionId, MenuSeparatorId, ParticipantKey, SamplerId,
    TargetId, ZoneId,
};
pub use id::ParticipantId;
pub use sample::{
    SAMPLE_RATE_MAXIMUM, SAMPLE_RATE_MINIMUM, Sample, SampleChannelCount, SampleRate,
    validate_channel_count,
};
pub use visibility::PropertyVisibility;
pub use zone::{
    CONTROL_COUNT, MIDI_VALUE_MAX, MidiData, Zone, ZoneComparer, ZoneField, ZoneStatus, ZoneValue,
};

/// Host version reported to plugins.
pub const MAJOR_VERSION: u32 = 0;
/// Host minor version reported to plugins.
pub const MINOR_VERSION: u32 = 4;
/// Host revision reported to plugins.
pub const REVISION: u32 = 0;

/// Lifecycle state of a session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session is loaded.
    #[default]
    #[strum(to_string = "not loaded")]
    NotLoaded,
    /// A session is being read from disk.
    #[strum(to_string = "loading")]
    Loading,
    /// A session is loaded and matches what is on disk.
    #[strum(to_string = "loaded")]
    LoadedClean,
    /// A session is loaded and has unsaved changes.
    #[strum(to_string = "modified")]
    LoadedDirty,
    /// The session is being written to disk.
    #[strum(to_string = "saving")]
    Saving,
    /// The session is being torn down.
    #[strum(to_string = "unloading")]
    Unloading,
}

impl SessionState {
    /// Check whether a session is currently loaded (clean or dirty).
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::LoadedClean | Self::LoadedDirty)
    }
}
