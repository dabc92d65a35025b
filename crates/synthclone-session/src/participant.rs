//! The participant contract implemented by plugins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use synthclone_core::{EffectId, SamplerId, TargetId};

use crate::context::Context;

/// Descriptive information about a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub revision: u32,
    pub author: String,
    pub summary: String,
}

impl ParticipantInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            major_version: 0,
            minor_version: 0,
            revision: 0,
            author: String::new(),
            summary: String::new(),
        }
    }

    /// Version as `major.minor.revision`.
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version, self.minor_version, self.revision
        )
    }
}

/// A node in the tree of plugin identities.
///
/// Participants are driven from the coordination thread. The session hands
/// an active participant its [`Context`]; everything the participant adds
/// through that context is removed again when it is deactivated.
///
/// State values are opaque to the host and are saved and restored as-is.
pub trait Participant {
    fn info(&self) -> ParticipantInfo;

    /// Called when the participant becomes active. `state` is what
    /// [`Participant::state`] returned when the session was saved, or
    /// `Value::Null`.
    fn activate(&self, context: &Context, state: &Value);

    /// Called before the context tears down what the participant created.
    fn deactivate(&self, _context: &Context) {}

    /// Participant-wide state to persist.
    fn state(&self) -> Value {
        Value::Null
    }

    /// State of an effect this participant created.
    fn effect_state(&self, _effect: EffectId) -> Value {
        Value::Null
    }

    /// State of the sampler this participant created.
    fn sampler_state(&self, _sampler: SamplerId) -> Value {
        Value::Null
    }

    /// State of a target this participant created.
    fn target_state(&self, _target: TargetId) -> Value {
        Value::Null
    }

    /// Recreate an effect from a saved state.
    fn restore_effect(&self, _context: &Context, _state: &Value) {}

    /// Recreate the sampler from a saved state.
    fn restore_sampler(&self, _context: &Context, _state: &Value) {}

    /// Recreate a target from a saved state.
    fn restore_target(&self, _context: &Context, _state: &Value) {}
}
