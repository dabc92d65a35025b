//! Trimmer: an effect that cuts silence from both ends of a sample.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use synthclone_core::{ComponentError, EffectId, Sample, Zone};
use synthclone_session::{
    Component, ComponentCore, Context, Effect, Menu, MenuAction, MenuLocation, Participant,
    ParticipantInfo, Registration,
};

use crate::runtime::Plugin;
use crate::types::{PluginError, PluginResult};

/// Plugin id of the trimmer.
pub const TRIMMER_ID: &str = "org.synthclone.plugins.trimmer";

/// Threshold new effects start with, in dBFS.
pub const DEFAULT_THRESHOLD: f32 = -70.0;

/// Lowest accepted threshold, in dBFS.
pub const MINIMUM_THRESHOLD: f32 = -120.0;

/// Removes leading and trailing frames whose peak stays below a threshold.
#[derive(Debug)]
pub struct TrimEffect {
    core: ComponentCore,
    threshold: Mutex<f32>,
}

impl TrimEffect {
    pub fn new(threshold: f32) -> PluginResult<Self> {
        check_threshold(threshold)?;
        Ok(Self {
            core: ComponentCore::new("Trimmer"),
            threshold: Mutex::new(threshold),
        })
    }

    /// Threshold in dBFS.
    pub fn threshold(&self) -> f32 {
        *self.threshold.lock()
    }

    pub fn set_threshold(&self, threshold: f32) -> PluginResult<()> {
        check_threshold(threshold)?;
        *self.threshold.lock() = threshold;
        Ok(())
    }

    /// Index range of the frames to keep, or `None` if every frame is below
    /// the threshold.
    pub fn audible_frames(&self, sample: &Sample) -> Option<(usize, usize)> {
        let level = 10f32.powf(self.threshold() / 20.0);
        let loud = |frame: &[f32]| frame.iter().any(|v| v.abs() > level);
        let channels = usize::from(sample.channels.max(1));
        let first = sample.data.chunks_exact(channels).position(loud)?;
        let last = sample.data.chunks_exact(channels).rposition(loud)?;
        Some((first, last))
    }
}

impl Component for TrimEffect {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

impl Effect for TrimEffect {
    fn process(&self, _zone: &Zone, sample: &Sample) -> Result<Sample, ComponentError> {
        self.core.set_progress(0.0);
        self.core.set_status("Trimming");

        let result = match self.audible_frames(sample) {
            Some((first, last)) => {
                let channels = usize::from(sample.channels);
                let data = sample.data[first * channels..(last + 1) * channels].to_vec();
                tracing::debug!(
                    target: "plugin",
                    leading = first,
                    trailing = sample.frames() - 1 - last,
                    "trimmed sample"
                );
                Sample::new(sample.rate, sample.channels, data)
                    .map_err(|e| ComponentError::new(self.name(), e.to_string()))
            }
            None => Err(ComponentError::new(
                self.name(),
                "the sample contains only silence",
            )),
        };

        self.core.set_progress(1.0);
        self.core.set_status("");
        result
    }
}

fn check_threshold(threshold: f32) -> PluginResult<()> {
    if !(MINIMUM_THRESHOLD..=0.0).contains(&threshold) {
        return Err(PluginError::setting(
            "threshold",
            format!("{threshold} dB is not in {MINIMUM_THRESHOLD}..=0"),
        ));
    }
    Ok(())
}

type EffectTable = Rc<RefCell<IndexMap<EffectId, Arc<TrimEffect>>>>;

/// Root participant of the trimmer plugin.
#[derive(Default)]
pub struct Trimmer {
    effects: EffectTable,
}

impl Trimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trim effects this participant has added, in creation order.
    pub fn effects(&self) -> Vec<(EffectId, Arc<TrimEffect>)> {
        self.effects
            .borrow()
            .iter()
            .map(|(id, e)| (*id, Arc::clone(e)))
            .collect()
    }
}

/// Add a trim effect through `context`, with a "Remove" action in its menu.
fn add_trim_effect(
    context: &Context,
    effects: &EffectTable,
    effect: TrimEffect,
) -> Registration<EffectId> {
    let effect = Arc::new(effect);
    let registration = context.add_effect(effect.clone(), None);
    let id = registration.id();
    effects.borrow_mut().insert(id, effect);

    let table: Weak<_> = Rc::downgrade(effects);
    registration.on_unregistered(move |id, _| {
        if let Some(table) = table.upgrade() {
            table.borrow_mut().shift_remove(&id);
        }
    });

    let remove = MenuAction::new("Remove");
    let ctx = context.clone();
    remove.on_triggered(move || ctx.remove_effect(id));
    context.add_menu_action(remove, MenuLocation::Effect(id), &[]);

    tracing::debug!(target: "plugin", effect = %id, "trim effect added");
    registration
}

impl Participant for Trimmer {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            major_version: 0,
            minor_version: 4,
            revision: 0,
            author: "synthclone developers".to_string(),
            summary: "Removes silence from the start and end of samples".to_string(),
            ..ParticipantInfo::new("Trimmer")
        }
    }

    fn activate(&self, context: &Context, _state: &Value) {
        let action = MenuAction::new("Trimmer");
        action.set_description("Add an effect that trims silence from samples");
        let effects = Rc::clone(&self.effects);
        let ctx = context.clone();
        action.on_triggered(move || {
            // The default threshold is always in range.
            if let Ok(effect) = TrimEffect::new(DEFAULT_THRESHOLD) {
                add_trim_effect(&ctx, &effects, effect);
            }
        });
        context.add_menu_action(action, Menu::AddEffect, &[]);
    }

    fn deactivate(&self, _context: &Context) {
        tracing::debug!(
            target: "plugin",
            effects = self.effects.borrow().len(),
            "trimmer deactivating"
        );
    }

    fn effect_state(&self, effect: EffectId) -> Value {
        match self.effects.borrow().get(&effect) {
            Some(effect) => json!({ "threshold": effect.threshold() }),
            None => Value::Null,
        }
    }

    fn restore_effect(&self, context: &Context, state: &Value) {
        let threshold = match state.get("threshold") {
            None => DEFAULT_THRESHOLD,
            Some(value) => match value.as_f64() {
                Some(t) => t as f32,
                None => {
                    context.report_error(format!("Trimmer: invalid threshold {value}"));
                    return;
                }
            },
        };
        match TrimEffect::new(threshold) {
            Ok(effect) => {
                add_trim_effect(context, &self.effects, effect);
            }
            Err(e) => context.report_error(format!("Trimmer: {e}")),
        }
    }
}

/// The trimmer as a loadable plugin.
#[derive(Clone, Default)]
pub struct TrimmerPlugin {
    trimmer: Rc<Trimmer>,
}

impl TrimmerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trimmer(&self) -> Rc<Trimmer> {
        Rc::clone(&self.trimmer)
    }
}

impl Plugin for TrimmerPlugin {
    fn id(&self) -> &str {
        TRIMMER_ID
    }

    fn participant(&self) -> Rc<dyn Participant> {
        self.trimmer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthclone_core::SampleRate;

    fn sample(channels: u16, data: Vec<f32>) -> Sample {
        Sample::new(SampleRate::new(44100).unwrap(), channels, data).unwrap()
    }

    #[test]
    fn test_trims_both_ends() {
        let effect = TrimEffect::new(-20.0).unwrap();
        let input = sample(1, vec![0.0, 0.01, 0.5, 0.0, -0.4, 0.001, 0.0]);
        let output = effect.process(&Zone::default(), &input).unwrap();
        assert_eq!(output.data, vec![0.5, 0.0, -0.4]);
        assert_eq!(effect.core().progress(), 1.0);
    }

    #[test]
    fn test_any_channel_keeps_a_frame() {
        let effect = TrimEffect::new(-20.0).unwrap();
        let input = sample(2, vec![0.0, 0.0, 0.0, 0.9, 0.3, 0.0, 0.0, 0.0]);
        let output = effect.process(&Zone::default(), &input).unwrap();
        assert_eq!(output.data, vec![0.0, 0.9, 0.3, 0.0]);
        assert_eq!(output.channels, 2);
    }

    #[test]
    fn test_silence_is_an_error() {
        let effect = TrimEffect::new(DEFAULT_THRESHOLD).unwrap();
        let input = sample(1, vec![0.0; 32]);
        let err = effect.process(&Zone::default(), &input).unwrap_err();
        assert_eq!(err.component, "Trimmer");
        assert!(err.message.contains("silence"));
    }

    #[test]
    fn test_threshold_range() {
        assert!(TrimEffect::new(1.0).is_err());
        assert!(TrimEffect::new(-121.0).is_err());
        let effect = TrimEffect::new(0.0).unwrap();
        assert!(effect.set_threshold(f32::NAN).is_err());
        effect.set_threshold(-6.0).unwrap();
        assert_eq!(effect.threshold(), -6.0);
    }
}
