//! Storage behind the session.

use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use synthclone_core::{
    ComponentRecord, EffectId, JobId, MenuActionId, MenuSeparatorId, ParticipantId,
    ParticipantKey, ParticipantRecord, PropertyVisibility, SampleChannelCount, SampleRate,
    SamplerId, SessionState, TargetId, Zone, ZoneId,
};
use tokio_util::sync::CancellationToken;

use crate::component::ComponentId;
use crate::menu::MenuLocation;
use crate::participant::Participant;
use crate::registration::{Registrable, Registration};

/// A registered object, who created it and its registration.
pub(crate) struct Entry<H: Registrable> {
    pub object: H::Removed,
    pub creator: ParticipantKey,
    pub registration: Registration<H>,
}

pub(crate) struct MenuEntry<H: Registrable> {
    pub entry: Entry<H>,
    pub location: MenuLocation,
    pub sub_menus: Vec<String>,
}

pub(crate) struct ParticipantEntry {
    pub participant: Rc<dyn Participant>,
    pub id: ParticipantId,
    pub parent: Option<ParticipantKey>,
    pub active: bool,
    /// State to hand to `activate`, and to save while inactive.
    pub saved_state: Value,
    pub registration: Registration<ParticipantKey>,
}

pub(crate) struct ZoneEntry {
    pub zone: Zone,
    pub selected: bool,
    pub registration: Registration<ZoneId>,
}

pub(crate) struct RunningJob {
    pub id: JobId,
    pub attempt: u64,
    pub cancel: CancellationToken,
    pub aborting: bool,
}

/// Saved records whose creator is not registered or not active. They are
/// written back unchanged on the next save.
#[derive(Default)]
pub(crate) struct Orphans {
    pub participants: Vec<ParticipantRecord>,
    pub effects: Vec<ComponentRecord>,
    pub targets: Vec<ComponentRecord>,
    pub sampler: Option<ComponentRecord>,
}

#[derive(Default)]
pub(crate) struct SessionData {
    pub state: SessionState,
    pub directory: Option<PathBuf>,
    pub sample_rate: Option<SampleRate>,
    pub channel_count: SampleChannelCount,
    pub visibility: PropertyVisibility,

    pub participants: IndexMap<ParticipantKey, ParticipantEntry>,
    pub effects: IndexMap<EffectId, Entry<EffectId>>,
    pub targets: IndexMap<TargetId, Entry<TargetId>>,
    pub sampler: Option<(SamplerId, Entry<SamplerId>)>,
    pub menu_actions: IndexMap<MenuActionId, MenuEntry<MenuActionId>>,
    pub menu_separators: IndexMap<MenuSeparatorId, MenuEntry<MenuSeparatorId>>,
    pub zones: IndexMap<ZoneId, ZoneEntry>,
    pub effect_jobs: IndexMap<JobId, Entry<JobId>>,
    pub sampler_jobs: IndexMap<JobId, Entry<JobId>>,

    pub current_effect_job: Option<RunningJob>,
    pub current_sampler_job: Option<RunningJob>,
    pub selected_effect: Option<EffectId>,
    pub selected_target: Option<TargetId>,
    pub focused: Option<ComponentId>,

    pub orphans: Orphans,
    pub quit_requested: bool,
}

impl SessionData {
    pub fn new() -> Self {
        Self {
            channel_count: 2,
            ..Self::default()
        }
    }

    pub fn has_component(&self, component: ComponentId) -> bool {
        match component {
            ComponentId::Effect(id) => self.effects.contains_key(&id),
            ComponentId::Target(id) => self.targets.contains_key(&id),
            ComponentId::Sampler(id) => self.sampler.as_ref().is_some_and(|(s, _)| *s == id),
        }
    }

    pub fn has_location(&self, location: MenuLocation) -> bool {
        location.component().is_none_or(|c| self.has_component(c))
    }
}

/// Resolve an insertion index; `None` appends.
///
/// # Panics
///
/// Panics if `index` is past the end.
pub(crate) fn insert_position(index: Option<usize>, len: usize, what: &str) -> usize {
    match index {
        None => len,
        Some(index) => {
            assert!(
                index <= len,
                "{what} index {index} is out of range (count is {len})"
            );
            index
        }
    }
}

/// # Panics
///
/// Panics if `index` does not address an existing element.
pub(crate) fn check_index(index: usize, len: usize, what: &str) {
    assert!(
        index < len,
        "{what} index {index} is out of range (count is {len})"
    );
}
