//! Zone generator: fills the session with zones over a note range.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use synthclone_core::{MIDI_VALUE_MAX, MidiData, ZoneValue};
use synthclone_session::{Context, Menu, MenuAction, Participant, ParticipantInfo};

use crate::runtime::Plugin;
use crate::types::{PluginError, PluginResult};

/// Plugin id of the zone generator.
pub const ZONE_GENERATOR_ID: &str = "org.synthclone.plugins.zonegenerator";

/// Number of distinct MIDI data values.
const MIDI_VALUES: u16 = MIDI_VALUE_MAX as u16 + 1;

/// What the zone generator produces. Persisted as the participant state.
///
/// Keys this version does not know are kept and written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneGeneratorSettings {
    aftertouch_layers: u8,
    channel: MidiData,
    channel_pressure_layers: u8,
    first_note: MidiData,
    last_note: MidiData,
    release_time: f32,
    sample_time: f32,
    total_notes: u8,
    velocity_layers: u8,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for ZoneGeneratorSettings {
    fn default() -> Self {
        Self {
            aftertouch_layers: 0,
            channel: 1,
            channel_pressure_layers: 0,
            first_note: 0,
            last_note: MIDI_VALUE_MAX,
            release_time: 1.0,
            sample_time: 5.0,
            total_notes: 128,
            velocity_layers: 8,
            extra: Map::new(),
        }
    }
}

impl ZoneGeneratorSettings {
    /// Parse a saved state blob. `Null` yields the defaults.
    pub fn from_state(state: &Value) -> PluginResult<Self> {
        if state.is_null() {
            return Ok(Self::default());
        }
        let settings: Self = serde_json::from_value(state.clone())
            .map_err(|e| PluginError::setting("zone generator state", e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// State blob for saving.
    pub fn to_state(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn validate(&self) -> PluginResult<()> {
        check_layers("aftertouch layers", self.aftertouch_layers, 0)?;
        check_channel(self.channel)?;
        check_layers("channel pressure layers", self.channel_pressure_layers, 0)?;
        check_note("first note", self.first_note)?;
        check_note("last note", self.last_note)?;
        if self.first_note > self.last_note {
            return Err(PluginError::setting(
                "note range",
                format!("{} is above {}", self.first_note, self.last_note),
            ));
        }
        check_time("release time", self.release_time, true)?;
        check_time("sample time", self.sample_time, false)?;
        if self.total_notes == 0 || u16::from(self.total_notes) > self.note_span() {
            return Err(PluginError::setting(
                "total notes",
                format!("{} does not fit the note range", self.total_notes),
            ));
        }
        if !(1..=MIDI_VALUE_MAX).contains(&self.velocity_layers) {
            return Err(PluginError::setting(
                "velocity layers",
                format!("{} is not in 1..=127", self.velocity_layers),
            ));
        }
        Ok(())
    }

    pub fn aftertouch_layers(&self) -> u8 {
        self.aftertouch_layers
    }

    /// Number of aftertouch values per note, `0` for none.
    pub fn set_aftertouch_layers(&mut self, layers: u8) -> PluginResult<()> {
        check_layers("aftertouch layers", layers, 0)?;
        self.aftertouch_layers = layers;
        Ok(())
    }

    pub fn channel(&self) -> MidiData {
        self.channel
    }

    pub fn set_channel(&mut self, channel: MidiData) -> PluginResult<()> {
        check_channel(channel)?;
        self.channel = channel;
        Ok(())
    }

    pub fn channel_pressure_layers(&self) -> u8 {
        self.channel_pressure_layers
    }

    /// Number of channel pressure values per note, `0` for none.
    pub fn set_channel_pressure_layers(&mut self, layers: u8) -> PluginResult<()> {
        check_layers("channel pressure layers", layers, 0)?;
        self.channel_pressure_layers = layers;
        Ok(())
    }

    pub fn first_note(&self) -> MidiData {
        self.first_note
    }

    /// Set the lowest note. Raises the last note if it would fall below.
    pub fn set_first_note(&mut self, note: MidiData) -> PluginResult<()> {
        check_note("first note", note)?;
        self.first_note = note;
        if self.last_note < note {
            self.last_note = note;
        }
        self.clamp_total_notes();
        Ok(())
    }

    pub fn last_note(&self) -> MidiData {
        self.last_note
    }

    /// Set the highest note. Lowers the first note if it would rise above.
    pub fn set_last_note(&mut self, note: MidiData) -> PluginResult<()> {
        check_note("last note", note)?;
        self.last_note = note;
        if self.first_note > note {
            self.first_note = note;
        }
        self.clamp_total_notes();
        Ok(())
    }

    pub fn release_time(&self) -> f32 {
        self.release_time
    }

    pub fn set_release_time(&mut self, seconds: f32) -> PluginResult<()> {
        check_time("release time", seconds, true)?;
        self.release_time = seconds;
        Ok(())
    }

    pub fn sample_time(&self) -> f32 {
        self.sample_time
    }

    pub fn set_sample_time(&mut self, seconds: f32) -> PluginResult<()> {
        check_time("sample time", seconds, false)?;
        self.sample_time = seconds;
        Ok(())
    }

    pub fn total_notes(&self) -> u8 {
        self.total_notes
    }

    /// Set how many notes of the range get zones.
    ///
    /// Widens the range when it is too narrow, first upwards from the first
    /// note and then downwards from the last.
    pub fn set_total_notes(&mut self, total: u8) -> PluginResult<()> {
        if total == 0 || u16::from(total) > MIDI_VALUES {
            return Err(PluginError::setting(
                "total notes",
                format!("{total} is not in 1..=128"),
            ));
        }
        self.total_notes = total;
        let needed = u16::from(total);
        if self.note_span() < needed {
            let last = (u16::from(self.first_note) + needed - 1).min(u16::from(MIDI_VALUE_MAX));
            self.last_note = last as MidiData;
        }
        if self.note_span() < needed {
            self.first_note = (u16::from(self.last_note) + 1 - needed) as MidiData;
        }
        Ok(())
    }

    pub fn velocity_layers(&self) -> u8 {
        self.velocity_layers
    }

    pub fn set_velocity_layers(&mut self, layers: u8) -> PluginResult<()> {
        check_layers("velocity layers", layers, 1)?;
        if layers > MIDI_VALUE_MAX {
            return Err(PluginError::setting(
                "velocity layers",
                format!("{layers} is not in 1..=127"),
            ));
        }
        self.velocity_layers = layers;
        Ok(())
    }

    /// Notes that get zones, spread evenly over the range.
    pub fn notes(&self) -> Vec<MidiData> {
        let first = u16::from(self.first_note);
        let span = self.note_span() - 1;
        let total = u16::from(self.total_notes);
        if total <= 1 {
            return vec![self.first_note];
        }
        (0..total)
            .map(|i| {
                let offset = (f32::from(i) * f32::from(span) / f32::from(total - 1)).round();
                (first + offset as u16) as MidiData
            })
            .collect()
    }

    /// Velocities, one per layer, ending at 127.
    pub fn velocities(&self) -> Vec<MidiData> {
        layer_values(self.velocity_layers)
            .into_iter()
            .map(|v| v.max(1))
            .collect()
    }

    /// Aftertouch values, or a single `None` without layers.
    pub fn aftertouch_values(&self) -> Vec<Option<MidiData>> {
        optional_layer_values(self.aftertouch_layers)
    }

    /// Channel pressure values, or a single `None` without layers.
    pub fn channel_pressure_values(&self) -> Vec<Option<MidiData>> {
        optional_layer_values(self.channel_pressure_layers)
    }

    /// Number of zones [`ZoneGenerator::generate`] adds.
    pub fn zone_count(&self) -> usize {
        self.notes().len()
            * self.velocities().len()
            * self.aftertouch_values().len()
            * self.channel_pressure_values().len()
    }

    fn note_span(&self) -> u16 {
        u16::from(self.last_note) - u16::from(self.first_note) + 1
    }

    fn clamp_total_notes(&mut self) {
        let span = self.note_span();
        if u16::from(self.total_notes) > span {
            self.total_notes = span as u8;
        }
    }
}

fn check_note(setting: &'static str, note: MidiData) -> PluginResult<()> {
    if note > MIDI_VALUE_MAX {
        return Err(PluginError::setting(setting, format!("{note} is not in 0..=127")));
    }
    Ok(())
}

fn check_channel(channel: MidiData) -> PluginResult<()> {
    if !(1..=16).contains(&channel) {
        return Err(PluginError::setting(
            "channel",
            format!("{channel} is not in 1..=16"),
        ));
    }
    Ok(())
}

fn check_layers(setting: &'static str, layers: u8, min: u8) -> PluginResult<()> {
    if layers < min || u16::from(layers) > MIDI_VALUES {
        return Err(PluginError::setting(
            setting,
            format!("{layers} is not in {min}..=128"),
        ));
    }
    Ok(())
}

fn check_time(setting: &'static str, seconds: f32, allow_zero: bool) -> PluginResult<()> {
    let valid = seconds.is_finite() && (seconds > 0.0 || (allow_zero && seconds == 0.0));
    if !valid {
        return Err(PluginError::setting(
            setting,
            format!("{seconds} is out of range"),
        ));
    }
    Ok(())
}

/// `layers` values splitting `0..=127` into equal bands, each taking the
/// top of its band.
fn layer_values(layers: u8) -> Vec<MidiData> {
    let layers = u16::from(layers);
    (1..=layers)
        .map(|layer| (MIDI_VALUES * layer).div_ceil(layers) - 1)
        .map(|v| v as MidiData)
        .collect()
}

fn optional_layer_values(layers: u8) -> Vec<Option<MidiData>> {
    if layers == 0 {
        return vec![None];
    }
    layer_values(layers).into_iter().map(Some).collect()
}

/// Root participant of the zone generator plugin.
#[derive(Default)]
pub struct ZoneGenerator {
    settings: Rc<RefCell<ZoneGeneratorSettings>>,
    context: RefCell<Option<Context>>,
}

impl ZoneGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> ZoneGeneratorSettings {
        self.settings.borrow().clone()
    }

    pub fn set_settings(&self, settings: ZoneGeneratorSettings) {
        *self.settings.borrow_mut() = settings;
        if let Some(context) = &*self.context.borrow() {
            context.set_session_modified();
        }
    }

    pub fn is_active(&self) -> bool {
        self.context.borrow().is_some()
    }

    /// Add zones for the current settings. Returns how many were added.
    pub fn generate(&self) -> PluginResult<usize> {
        let context = self
            .context
            .borrow()
            .clone()
            .ok_or_else(|| PluginError::Inactive {
                id: ZONE_GENERATOR_ID.to_string(),
            })?;
        let settings = self.settings();
        generate_zones(&context, &settings)
    }
}

fn generate_zones(context: &Context, settings: &ZoneGeneratorSettings) -> PluginResult<usize> {
    let velocities = settings.velocities();
    let aftertouch = settings.aftertouch_values();
    let pressure = settings.channel_pressure_values();

    let mut added = 0;
    for note in settings.notes() {
        for &velocity in &velocities {
            for &aftertouch in &aftertouch {
                for &pressure in &pressure {
                    let zone = context.add_zone(None).id();
                    for value in [
                        ZoneValue::Channel(settings.channel),
                        ZoneValue::Note(note),
                        ZoneValue::Velocity(velocity),
                        ZoneValue::Aftertouch(aftertouch),
                        ZoneValue::ChannelPressure(pressure),
                        ZoneValue::ReleaseTime(settings.release_time),
                        ZoneValue::SampleTime(settings.sample_time),
                    ] {
                        context.set_zone_property(zone, value)?;
                    }
                    added += 1;
                }
            }
        }
    }
    tracing::info!(target: "plugin", zones = added, "zones generated");
    Ok(added)
}

impl Participant for ZoneGenerator {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            major_version: 0,
            minor_version: 4,
            revision: 0,
            author: "synthclone developers".to_string(),
            summary: "Generates zones over a note range with velocity, aftertouch and \
                      channel pressure layers"
                .to_string(),
            ..ParticipantInfo::new("Zone Generator")
        }
    }

    fn activate(&self, context: &Context, state: &Value) {
        match ZoneGeneratorSettings::from_state(state) {
            Ok(settings) if !state.is_null() => *self.settings.borrow_mut() = settings,
            Ok(_) => {}
            Err(e) => context.report_error(format!("Zone Generator: {e}")),
        }

        let action = MenuAction::new("Generate Zones");
        action.set_description("Add zones for the configured note range and layers");
        let settings = Rc::clone(&self.settings);
        let ctx = context.clone();
        action.on_triggered(move || {
            let snapshot = settings.borrow().clone();
            if let Err(e) = generate_zones(&ctx, &snapshot) {
                ctx.report_error(format!("Zone Generator: {e}"));
            }
        });
        context.add_menu_action(action, Menu::Tools, &[]);
        *self.context.borrow_mut() = Some(context.clone());
    }

    fn deactivate(&self, _context: &Context) {
        self.context.borrow_mut().take();
    }

    fn state(&self) -> Value {
        self.settings.borrow().to_state()
    }
}

/// The zone generator as a loadable plugin.
#[derive(Clone, Default)]
pub struct ZoneGeneratorPlugin {
    generator: Rc<ZoneGenerator>,
}

impl ZoneGeneratorPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root participant, for driving it directly.
    pub fn generator(&self) -> Rc<ZoneGenerator> {
        Rc::clone(&self.generator)
    }
}

impl Plugin for ZoneGeneratorPlugin {
    fn id(&self) -> &str {
        ZONE_GENERATOR_ID
    }

    fn participant(&self) -> Rc<dyn Participant> {
        self.generator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = ZoneGeneratorSettings::default();
        assert_eq!(settings.notes().len(), 128);
        assert_eq!(settings.velocities(), [15, 31, 47, 63, 79, 95, 111, 127]);
        assert_eq!(settings.aftertouch_values(), [None]);
        assert_eq!(settings.zone_count(), 128 * 8);
    }

    #[test]
    fn test_first_note_raises_last_note() {
        let mut settings = ZoneGeneratorSettings::default();
        settings.set_last_note(40).unwrap();
        assert_eq!(settings.total_notes(), 41);

        settings.set_first_note(60).unwrap();
        assert_eq!(settings.last_note(), 60);
        assert_eq!(settings.total_notes(), 1);
        assert_eq!(settings.notes(), [60]);
    }

    #[test]
    fn test_last_note_lowers_first_note() {
        let mut settings = ZoneGeneratorSettings::default();
        settings.set_first_note(100).unwrap();
        settings.set_last_note(20).unwrap();
        assert_eq!(settings.first_note(), 20);
        assert_eq!(settings.total_notes(), 1);
    }

    #[test]
    fn test_total_notes_widens_range() {
        let mut settings = ZoneGeneratorSettings::default();
        settings.set_first_note(120).unwrap();
        assert_eq!(settings.total_notes(), 8);

        settings.set_total_notes(12).unwrap();
        assert_eq!(settings.last_note(), 127);
        assert_eq!(settings.first_note(), 116);
        assert_eq!(settings.notes().len(), 12);
    }

    #[test]
    fn test_notes_spread_over_range() {
        let mut settings = ZoneGeneratorSettings::default();
        settings.set_first_note(36).unwrap();
        settings.set_last_note(96).unwrap();
        settings.set_total_notes(5).unwrap();
        assert_eq!(settings.notes(), [36, 51, 66, 81, 96]);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut settings = ZoneGeneratorSettings::default();
        assert!(settings.set_channel(0).is_err());
        assert!(settings.set_channel(17).is_err());
        assert!(settings.set_velocity_layers(0).is_err());
        assert!(settings.set_velocity_layers(128).is_err());
        assert!(settings.set_total_notes(0).is_err());
        assert!(settings.set_first_note(128).is_err());
        assert!(settings.set_sample_time(0.0).is_err());
        assert!(settings.set_release_time(-1.0).is_err());
        assert!(settings.set_release_time(0.0).is_ok());
        assert_eq!(settings.channel(), 1);
    }

    #[test]
    fn test_layer_values() {
        assert_eq!(layer_values(1), [127]);
        assert_eq!(layer_values(2), [63, 127]);
        assert_eq!(layer_values(128).first(), Some(&0));
        assert_eq!(optional_layer_values(0), [None]);
        assert_eq!(optional_layer_values(4), [Some(31), Some(63), Some(95), Some(127)]);
    }

    #[test]
    fn test_state_keeps_unknown_keys() {
        let state = json!({"velocity_layers": 4, "future": [1, 2]});
        let settings = ZoneGeneratorSettings::from_state(&state).unwrap();
        assert_eq!(settings.velocity_layers(), 4);
        assert_eq!(settings.channel(), 1);

        let saved = settings.to_state();
        assert_eq!(saved["future"], json!([1, 2]));
        assert_eq!(saved["velocity_layers"], json!(4));
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        assert!(ZoneGeneratorSettings::from_state(&json!({"channel": 40})).is_err());
        assert!(ZoneGeneratorSettings::from_state(&json!({"first_note": 90, "last_note": 10})).is_err());
        assert!(ZoneGeneratorSettings::from_state(&json!("nonsense")).is_err());
        assert_eq!(
            ZoneGeneratorSettings::from_state(&Value::Null).unwrap(),
            ZoneGeneratorSettings::default()
        );
    }
}
