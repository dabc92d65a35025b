//! Session configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::sample::{SAMPLE_RATE_MAXIMUM, SAMPLE_RATE_MINIMUM, SampleChannelCount, SampleRate};

/// Settings for creating a new session.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SessionConfig {
    /// Directory the session lives in.
    pub directory: PathBuf,

    /// Sample rate in Hz (None = not set).
    #[builder(default = "Some(44100)")]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: Option<u32>,

    /// Channels per sample.
    #[builder(default = "2")]
    #[serde(default = "default_channel_count")]
    pub channel_count: SampleChannelCount,
}

fn default_sample_rate() -> Option<u32> {
    Some(44100)
}

fn default_channel_count() -> SampleChannelCount {
    2
}

impl SessionConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.directory {
            Some(ref dir) if dir.as_os_str().is_empty() => {
                return Err("Session directory cannot be empty".to_string());
            }
            None => return Err("Session directory is required".to_string()),
            _ => {}
        }
        if let Some(Some(rate)) = self.sample_rate
            && !(SAMPLE_RATE_MINIMUM..=SAMPLE_RATE_MAXIMUM).contains(&rate)
        {
            return Err(format!(
                "Sample rate {rate} must be between {SAMPLE_RATE_MINIMUM} and {SAMPLE_RATE_MAXIMUM}"
            ));
        }
        if self.channel_count == Some(0) {
            return Err("Channel count must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl SessionConfig {
    /// Create a new session config builder.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Create a config with default sample settings.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            sample_rate: default_sample_rate(),
            channel_count: default_channel_count(),
        }
    }

    /// Validated sample rate.
    pub fn rate(&self) -> Result<Option<SampleRate>, SessionError> {
        self.sample_rate.map(SampleRate::new).transpose()
    }
}
