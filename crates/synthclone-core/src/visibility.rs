//! Which zone attributes are shown to the user.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::zone::{MidiData, ZoneField};

/// Per-attribute visibility flags.
///
/// Rarely used MIDI attributes start hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyVisibility {
    pub aftertouch: bool,
    pub channel: bool,
    pub channel_pressure: bool,
    /// Controllers whose column is shown.
    pub controls: BTreeSet<MidiData>,
    pub dry_sample: bool,
    pub note: bool,
    pub release_time: bool,
    pub sample_time: bool,
    pub status: bool,
    pub velocity: bool,
    pub wet_sample: bool,
}

impl Default for PropertyVisibility {
    fn default() -> Self {
        Self {
            aftertouch: false,
            channel: false,
            channel_pressure: false,
            controls: BTreeSet::new(),
            dry_sample: true,
            note: true,
            release_time: true,
            sample_time: true,
            status: true,
            velocity: true,
            wet_sample: true,
        }
    }
}

impl PropertyVisibility {
    /// Check whether a field is visible.
    pub fn is_visible(&self, field: ZoneField) -> bool {
        match field {
            ZoneField::Aftertouch => self.aftertouch,
            ZoneField::Channel => self.channel,
            ZoneField::ChannelPressure => self.channel_pressure,
            ZoneField::Control(control) => self.controls.contains(&control),
            ZoneField::DrySample => self.dry_sample,
            ZoneField::Note => self.note,
            ZoneField::ReleaseTime => self.release_time,
            ZoneField::SampleTime => self.sample_time,
            ZoneField::Status => self.status,
            ZoneField::Velocity => self.velocity,
            ZoneField::WetSample => self.wet_sample,
        }
    }

    /// Set a field's visibility. Returns `true` if it changed.
    pub fn set_visible(&mut self, field: ZoneField, visible: bool) -> bool {
        let slot = match field {
            ZoneField::Control(control) => {
                return if visible {
                    self.controls.insert(control)
                } else {
                    self.controls.remove(&control)
                };
            }
            ZoneField::Aftertouch => &mut self.aftertouch,
            ZoneField::Channel => &mut self.channel,
            ZoneField::ChannelPressure => &mut self.channel_pressure,
            ZoneField::DrySample => &mut self.dry_sample,
            ZoneField::Note => &mut self.note,
            ZoneField::ReleaseTime => &mut self.release_time,
            ZoneField::SampleTime => &mut self.sample_time,
            ZoneField::Status => &mut self.status,
            ZoneField::Velocity => &mut self.velocity,
            ZoneField::WetSample => &mut self.wet_sample,
        };
        let changed = *slot != visible;
        *slot = visible;
        changed
    }

    /// Fields whose visibility differs in `other`, with their new value.
    pub fn changes_to(&self, other: &Self) -> Vec<(ZoneField, bool)> {
        let controls = self
            .controls
            .symmetric_difference(&other.controls)
            .map(|c| ZoneField::Control(*c));
        [
            ZoneField::Aftertouch,
            ZoneField::Channel,
            ZoneField::ChannelPressure,
            ZoneField::DrySample,
            ZoneField::Note,
            ZoneField::ReleaseTime,
            ZoneField::SampleTime,
            ZoneField::Status,
            ZoneField::Velocity,
            ZoneField::WetSample,
        ]
        .into_iter()
        .chain(controls)
        .filter(|f| self.is_visible(*f) != other.is_visible(*f))
        .map(|f| (f, other.is_visible(f)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let vis = PropertyVisibility::default();
        assert!(vis.is_visible(ZoneField::Note));
        assert!(!vis.is_visible(ZoneField::Aftertouch));
        assert!(!vis.is_visible(ZoneField::Control(1)));
    }

    #[test]
    fn test_set_visible_reports_change() {
        let mut vis = PropertyVisibility::default();
        assert!(vis.set_visible(ZoneField::Control(74), true));
        assert!(!vis.set_visible(ZoneField::Control(74), true));
        assert!(vis.is_visible(ZoneField::Control(74)));
        assert!(!vis.set_visible(ZoneField::Note, true));
        assert!(vis.set_visible(ZoneField::Note, false));
    }

    #[test]
    fn test_changes_to() {
        let from = PropertyVisibility::default();
        let mut to = from.clone();
        to.set_visible(ZoneField::Channel, true);
        to.set_visible(ZoneField::Control(10), true);
        to.set_visible(ZoneField::Status, false);

        let changes = from.changes_to(&to);
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&(ZoneField::Channel, true)));
        assert!(changes.contains(&(ZoneField::Control(10), true)));
        assert!(changes.contains(&(ZoneField::Status, false)));
        assert!(to.changes_to(&to).is_empty());
    }
}
