//! Sample buffers, sample rates and channel counts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Lowest supported sample rate, in Hz.
pub const SAMPLE_RATE_MINIMUM: u32 = 8000;
/// Highest supported sample rate, in Hz.
pub const SAMPLE_RATE_MAXIMUM: u32 = 192_000;

/// Number of interleaved channels in a sample.
pub type SampleChannelCount = u16;

/// A sample rate within [`SAMPLE_RATE_MINIMUM`, `SAMPLE_RATE_MAXIMUM`].
///
/// "Not set" is modelled as `Option<SampleRate>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SampleRate(u32);

impl SampleRate {
    /// Validate a rate in Hz.
    pub fn new(hz: u32) -> Result<Self, SessionError> {
        if (SAMPLE_RATE_MINIMUM..=SAMPLE_RATE_MAXIMUM).contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(SessionError::InvalidSampleRate { value: hz })
        }
    }

    /// Rate in Hz.
    pub fn hz(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = SessionError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Self::new(hz)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.0
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Reject a zero channel count.
pub fn validate_channel_count(count: SampleChannelCount) -> Result<SampleChannelCount, SessionError> {
    if count == 0 {
        Err(SessionError::InvalidChannelCount)
    } else {
        Ok(count)
    }
}

/// An in-memory interleaved `f32` sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Sample rate of the data.
    pub rate: SampleRate,
    /// Number of interleaved channels.
    pub channels: SampleChannelCount,
    /// Interleaved frames.
    pub data: Vec<f32>,
}

impl Sample {
    /// Create a sample, checking that `data` holds whole frames.
    pub fn new(
        rate: SampleRate,
        channels: SampleChannelCount,
        data: Vec<f32>,
    ) -> Result<Self, SessionError> {
        validate_channel_count(channels)?;
        if data.len() % usize::from(channels) != 0 {
            return Err(SessionError::InvalidSampleData {
                len: data.len(),
                channels,
            });
        }
        Ok(Self {
            rate,
            channels,
            data,
        })
    }

    /// Create a silent sample of `frames` frames.
    pub fn silent(rate: SampleRate, channels: SampleChannelCount, frames: usize) -> Self {
        Self {
            rate,
            channels: channels.max(1),
            data: vec![0.0; frames * usize::from(channels.max(1))],
        }
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.data.len() / usize::from(self.channels.max(1))
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.rate.hz())
    }

    /// Iterate over frames as channel slices.
    pub fn frame_iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(usize::from(self.channels.max(1)))
    }

    /// Check whether the sample has no frames.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
