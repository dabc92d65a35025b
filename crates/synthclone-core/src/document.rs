//! On-disk session document.
//!
//! A session directory holds `synthclone.json` and a `samples/` directory of
//! raw little-endian `f32` sample files. Participant and component state is
//! stored as opaque JSON values and round-trips byte-for-byte through
//! `serde_json`, including keys the host does not know about.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};
use crate::id::ParticipantId;
use crate::sample::{Sample, SampleChannelCount, SampleRate};
use crate::visibility::PropertyVisibility;
use crate::zone::Zone;

/// Name of the session file inside a session directory.
pub const SESSION_FILE_NAME: &str = "synthclone.json";
/// Name of the sample directory inside a session directory.
pub const SAMPLE_DIRECTORY_NAME: &str = "samples";
/// Directory a save writes new sample files into before they replace the
/// sample directory.
pub const SAMPLE_STAGING_DIRECTORY_NAME: &str = ".samples-staging";
/// Current document format version.
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Serialized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub sample_rate: Option<SampleRate>,
    pub sample_channel_count: SampleChannelCount,
    #[serde(default)]
    pub visibility: PropertyVisibility,
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,
    #[serde(default)]
    pub effects: Vec<ComponentRecord>,
    #[serde(default)]
    pub targets: Vec<ComponentRecord>,
    #[serde(default)]
    pub sampler: Option<ComponentRecord>,
    #[serde(default)]
    pub selected_effect: Option<usize>,
    #[serde(default)]
    pub selected_target: Option<usize>,
}

/// A zone plus its selection flag and sample files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone: Zone,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, rename = "dry_sample_file")]
    pub dry_sample: Option<SampleRecord>,
    #[serde(default, rename = "wet_sample_file")]
    pub wet_sample: Option<SampleRecord>,
}

/// Saved state of a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    pub active: bool,
    #[serde(default)]
    pub state: Value,
}

/// Saved state of an effect, sampler or target, keyed by its creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub participant: ParticipantId,
    #[serde(default)]
    pub state: Value,
}

/// Location and format of a stored sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// File name relative to the sample directory.
    pub file: String,
    pub rate: SampleRate,
    pub channels: SampleChannelCount,
}

impl SessionDocument {
    /// Create an empty document.
    pub fn new(sample_rate: Option<SampleRate>, sample_channel_count: SampleChannelCount) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            saved_at: Utc::now(),
            sample_rate,
            sample_channel_count,
            visibility: PropertyVisibility::default(),
            zones: Vec::new(),
            participants: Vec::new(),
            effects: Vec::new(),
            targets: Vec::new(),
            sampler: None,
            selected_effect: None,
            selected_target: None,
        }
    }

    /// Path of the session file in `dir`.
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(SESSION_FILE_NAME)
    }

    /// Check whether `dir` contains a session file.
    pub fn exists(dir: &Path) -> bool {
        Self::path(dir).is_file()
    }

    /// Read and version-check the document in `dir`.
    pub fn read(dir: &Path) -> SessionResult<Self> {
        let path = Self::path(dir);
        if !path.is_file() {
            return Err(SessionError::NotASession {
                path: dir.to_path_buf(),
            });
        }
        let text = fs::read_to_string(&path).map_err(|e| SessionError::io(&path, e))?;
        let doc: Self = serde_json::from_str(&text)?;
        if doc.version != SESSION_FORMAT_VERSION {
            return Err(SessionError::UnsupportedVersion {
                version: doc.version,
            });
        }
        Ok(doc)
    }

    /// Write the document into `dir`, creating the sample directory.
    pub fn write(&self, dir: &Path) -> SessionResult<()> {
        let samples = dir.join(SAMPLE_DIRECTORY_NAME);
        fs::create_dir_all(&samples).map_err(|e| SessionError::io(&samples, e))?;
        self.write_file(dir)
    }

    /// Replace the session file in `dir`. A failed write leaves the previous
    /// file in place.
    pub fn write_file(&self, dir: &Path) -> SessionResult<()> {
        let path = Self::path(dir);
        let text = serde_json::to_string_pretty(self)?;
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| SessionError::io(dir, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| SessionError::io(file.path(), e))?;
        file.persist(&path)
            .map_err(|e| SessionError::io(&path, e.error))?;
        Ok(())
    }
}

impl SampleRecord {
    /// Write `sample` into the sample directory of `dir` as `file`.
    pub fn write(dir: &Path, file: impl Into<String>, sample: &Sample) -> SessionResult<Self> {
        Self::write_in(&dir.join(SAMPLE_DIRECTORY_NAME), file, sample)
    }

    /// Write `sample` into the directory `samples` as `file`.
    ///
    /// `file` must be a plain file name.
    pub fn write_in(samples: &Path, file: impl Into<String>, sample: &Sample) -> SessionResult<Self> {
        let file = file.into();
        check_file_name(&file)?;
        let path = samples.join(&file);
        let bytes: Vec<u8> = sample.data.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(&path, bytes).map_err(|e| SessionError::io(&path, e))?;
        Ok(Self {
            file,
            rate: sample.rate,
            channels: sample.channels,
        })
    }

    /// Read the referenced sample from the sample directory of `dir`.
    pub fn read(&self, dir: &Path) -> SessionResult<Sample> {
        check_file_name(&self.file)?;
        let path = dir.join(SAMPLE_DIRECTORY_NAME).join(&self.file);
        let bytes = fs::read(&path).map_err(|e| SessionError::io(&path, e))?;
        if bytes.len() % 4 != 0 {
            return Err(SessionError::InvalidSampleData {
                len: bytes.len(),
                channels: self.channels,
            });
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Sample::new(self.rate, self.channels, data)
    }
}

/// Sample files live directly in the sample directory.
fn check_file_name(file: &str) -> SessionResult<()> {
    let mut components = Path::new(file).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SessionError::InvalidSampleFile {
            file: file.to_string(),
        }),
    }
}
