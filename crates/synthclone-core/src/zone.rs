//! Zones: sample slots addressed by MIDI attributes.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::sample::Sample;

/// A 7-bit MIDI data byte.
pub type MidiData = u8;

/// Largest valid MIDI data value.
pub const MIDI_VALUE_MAX: MidiData = 0x7f;

/// Number of MIDI continuous controllers.
pub const CONTROL_COUNT: usize = 0x80;

/// What a zone is currently doing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    /// Idle.
    #[default]
    #[strum(to_string = "normal")]
    Normal,
    /// The effect chain is producing a wet sample.
    #[strum(to_string = "generating wet sample")]
    GeneratingWetSample,
    /// The dry sample is being played back.
    #[strum(to_string = "playing dry sample")]
    PlayingDrySample,
    /// The wet sample is being played back.
    #[strum(to_string = "playing wet sample")]
    PlayingWetSample,
    /// The sampler is capturing the dry sample.
    #[strum(to_string = "sampling")]
    Sampling,
}

/// A single zone.
///
/// The selection flag and queue membership are stored by the session, not
/// here. Samples are shared through `Arc` so zone snapshots stay cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Polyphonic aftertouch, if sent.
    #[serde(default)]
    pub aftertouch: Option<MidiData>,
    /// MIDI channel (1..=16).
    pub channel: MidiData,
    /// Channel pressure, if sent.
    #[serde(default)]
    pub channel_pressure: Option<MidiData>,
    /// Controller values sent before the note.
    #[serde(default)]
    pub controls: BTreeMap<MidiData, MidiData>,
    /// Note number.
    pub note: MidiData,
    /// Note-on velocity (1..=127).
    pub velocity: MidiData,
    /// Seconds recorded after note-off.
    pub release_time: f32,
    /// Seconds recorded in total.
    pub sample_time: f32,
    /// Current activity.
    #[serde(skip)]
    pub status: ZoneStatus,
    /// Recorded sample.
    #[serde(skip)]
    pub dry_sample: Option<Arc<Sample>>,
    /// Dry sample no longer matches the zone's MIDI attributes.
    #[serde(default)]
    pub dry_sample_stale: bool,
    /// Sample produced by the effect chain.
    #[serde(skip)]
    pub wet_sample: Option<Arc<Sample>>,
    /// Wet sample no longer matches the dry sample or the effect chain.
    #[serde(default)]
    pub wet_sample_stale: bool,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            aftertouch: None,
            channel: 1,
            channel_pressure: None,
            controls: BTreeMap::new(),
            note: 0x3c,
            velocity: MIDI_VALUE_MAX,
            release_time: 1.0,
            sample_time: 5.0,
            status: ZoneStatus::Normal,
            dry_sample: None,
            dry_sample_stale: false,
            wet_sample: None,
            wet_sample_stale: false,
        }
    }
}

/// Identifies one zone attribute, for visibility, sorting and change events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneField {
    Aftertouch,
    Channel,
    ChannelPressure,
    Control(MidiData),
    DrySample,
    Note,
    ReleaseTime,
    SampleTime,
    Status,
    Velocity,
    WetSample,
}

/// A new value for one zone attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneValue {
    Aftertouch(Option<MidiData>),
    Channel(MidiData),
    ChannelPressure(Option<MidiData>),
    Control(MidiData, Option<MidiData>),
    DrySample(Option<Arc<Sample>>),
    Note(MidiData),
    ReleaseTime(f32),
    SampleTime(f32),
    Status(ZoneStatus),
    Velocity(MidiData),
    WetSample(Option<Arc<Sample>>),
}

impl ZoneValue {
    /// The attribute this value targets.
    pub fn field(&self) -> ZoneField {
        match self {
            Self::Aftertouch(_) => ZoneField::Aftertouch,
            Self::Channel(_) => ZoneField::Channel,
            Self::ChannelPressure(_) => ZoneField::ChannelPressure,
            Self::Control(control, _) => ZoneField::Control(*control),
            Self::DrySample(_) => ZoneField::DrySample,
            Self::Note(_) => ZoneField::Note,
            Self::ReleaseTime(_) => ZoneField::ReleaseTime,
            Self::SampleTime(_) => ZoneField::SampleTime,
            Self::Status(_) => ZoneField::Status,
            Self::Velocity(_) => ZoneField::Velocity,
            Self::WetSample(_) => ZoneField::WetSample,
        }
    }

    /// Check the value against the attribute's valid range.
    pub fn validate(&self) -> Result<(), SessionError> {
        fn midi(field: &'static str, value: MidiData, min: MidiData) -> Result<(), SessionError> {
            if (min..=MIDI_VALUE_MAX).contains(&value) {
                Ok(())
            } else {
                Err(SessionError::InvalidMidiData {
                    field,
                    value: i64::from(value),
                })
            }
        }

        match *self {
            Self::Aftertouch(Some(v)) => midi("aftertouch", v, 0),
            Self::ChannelPressure(Some(v)) => midi("channel pressure", v, 0),
            Self::Channel(v) if !(1..=16).contains(&v) => Err(SessionError::InvalidMidiData {
                field: "channel",
                value: i64::from(v),
            }),
            Self::Control(control, value) => {
                midi("control", control, 0)?;
                value.map_or(Ok(()), |v| midi("control value", v, 0))
            }
            Self::Note(v) => midi("note", v, 0),
            Self::Velocity(v) => midi("velocity", v, 1),
            Self::ReleaseTime(t) if !(t.is_finite() && t >= 0.0) => {
                Err(SessionError::InvalidZoneProperty {
                    field: "release time",
                    message: format!("{t} is not a non-negative number of seconds"),
                })
            }
            Self::SampleTime(t) if !(t.is_finite() && t > 0.0) => {
                Err(SessionError::InvalidZoneProperty {
                    field: "sample time",
                    message: format!("{t} is not a positive number of seconds"),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Zone {
    /// Apply a validated value.
    ///
    /// Returns the attributes that changed, in order. A MIDI change marks the
    /// dry sample stale; a new dry sample clears that flag and marks the wet
    /// sample stale.
    pub fn apply(&mut self, value: ZoneValue) -> Result<Vec<ZoneField>, SessionError> {
        value.validate()?;
        let field = value.field();
        let changed = match value {
            ZoneValue::Aftertouch(v) => replace(&mut self.aftertouch, v),
            ZoneValue::Channel(v) => replace(&mut self.channel, v),
            ZoneValue::ChannelPressure(v) => replace(&mut self.channel_pressure, v),
            ZoneValue::Control(control, v) => {
                let old = match v {
                    Some(v) => self.controls.insert(control, v),
                    None => self.controls.remove(&control),
                };
                old != v
            }
            ZoneValue::DrySample(v) => {
                let changed = !same_sample(&self.dry_sample, &v);
                self.dry_sample = v;
                if changed {
                    self.dry_sample_stale = false;
                }
                changed
            }
            ZoneValue::Note(v) => replace(&mut self.note, v),
            ZoneValue::ReleaseTime(v) => replace(&mut self.release_time, v),
            ZoneValue::SampleTime(v) => replace(&mut self.sample_time, v),
            ZoneValue::Status(v) => replace(&mut self.status, v),
            ZoneValue::Velocity(v) => replace(&mut self.velocity, v),
            ZoneValue::WetSample(v) => {
                let changed = !same_sample(&self.wet_sample, &v);
                self.wet_sample = v;
                if changed {
                    self.wet_sample_stale = false;
                }
                changed
            }
        };
        if !changed {
            return Ok(Vec::new());
        }

        let mut fields = vec![field];
        if field.is_midi() || matches!(field, ZoneField::ReleaseTime | ZoneField::SampleTime) {
            self.dry_sample_stale = true;
        }
        if field == ZoneField::DrySample {
            self.wet_sample_stale = true;
            fields.push(ZoneField::WetSample);
        }
        Ok(fields)
    }

    /// Value of a controller, if one is sent.
    pub fn control(&self, control: MidiData) -> Option<MidiData> {
        self.controls.get(&control).copied()
    }
}

impl ZoneField {
    /// Check whether the field is a MIDI attribute that shapes the dry sample.
    pub fn is_midi(self) -> bool {
        matches!(
            self,
            Self::Aftertouch
                | Self::Channel
                | Self::ChannelPressure
                | Self::Control(_)
                | Self::Note
                | Self::Velocity
        )
    }

    /// Human-readable field name.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

fn same_sample(a: &Option<Arc<Sample>>, b: &Option<Arc<Sample>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Ordering used by zone sorting.
pub trait ZoneComparer {
    /// Compare two zones.
    fn compare(&self, a: &Zone, b: &Zone) -> Ordering;
}

impl<F> ZoneComparer for F
where
    F: Fn(&Zone, &Zone) -> Ordering,
{
    fn compare(&self, a: &Zone, b: &Zone) -> Ordering {
        self(a, b)
    }
}

impl ZoneComparer for ZoneField {
    fn compare(&self, a: &Zone, b: &Zone) -> Ordering {
        match *self {
            Self::Aftertouch => a.aftertouch.cmp(&b.aftertouch),
            Self::Channel => a.channel.cmp(&b.channel),
            Self::ChannelPressure => a.channel_pressure.cmp(&b.channel_pressure),
            Self::Control(control) => a.control(control).cmp(&b.control(control)),
            Self::DrySample => sample_key(&a.dry_sample).total_cmp(&sample_key(&b.dry_sample)),
            Self::Note => a.note.cmp(&b.note),
            Self::ReleaseTime => a.release_time.total_cmp(&b.release_time),
            Self::SampleTime => a.sample_time.total_cmp(&b.sample_time),
            Self::Status => a.status.cmp(&b.status),
            Self::Velocity => a.velocity.cmp(&b.velocity),
            Self::WetSample => sample_key(&a.wet_sample).total_cmp(&sample_key(&b.wet_sample)),
        }
    }
}

// Zones without a sample sort first, then by duration.
fn sample_key(sample: &Option<Arc<Sample>>) -> f64 {
    sample.as_ref().map_or(-1.0, |s| s.duration())
}
