//! Change notifications published by the session.
//!
//! Collection changes come in pairs: an about-to event (`Adding*`, `Moving*`,
//! `Removing*`) before the change and a did event (`*Added`, `*Moved`,
//! `*Removed`) after it.

use std::path::PathBuf;

use strum::{EnumCount, EnumDiscriminants, EnumIter, IntoStaticStr};
use synthclone_core::{
    EffectId, JobId, MenuActionId, MenuSeparatorId, MidiData, ParticipantId, ParticipantKey,
    SampleChannelCount, SampleRate, SamplerId, SessionState, TargetId, ZoneField, ZoneId,
};

use crate::component::ComponentId;
use crate::menu::MenuLocation;

/// A change notification.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(
    name(EventKind),
    derive(Hash, PartialOrd, Ord, EnumIter, EnumCount, IntoStaticStr)
)]
pub enum SessionEvent {
    // ==================== Effects ====================
    AddingEffect { effect: EffectId, index: usize },
    EffectAdded { effect: EffectId, index: usize },
    MovingEffect { effect: EffectId, from: usize, to: usize },
    EffectMoved { effect: EffectId, from: usize, to: usize },
    RemovingEffect { effect: EffectId, index: usize },
    EffectRemoved { effect: EffectId, index: usize },

    // ==================== Targets ====================
    AddingTarget { target: TargetId, index: usize },
    TargetAdded { target: TargetId, index: usize },
    MovingTarget { target: TargetId, from: usize, to: usize },
    TargetMoved { target: TargetId, from: usize, to: usize },
    RemovingTarget { target: TargetId, index: usize },
    TargetRemoved { target: TargetId, index: usize },

    // ==================== Sampler ====================
    AddingSampler { sampler: SamplerId },
    SamplerAdded { sampler: SamplerId },
    RemovingSampler { sampler: SamplerId },
    SamplerRemoved { sampler: SamplerId },

    // ==================== Effect jobs ====================
    AddingEffectJob { job: JobId, index: usize },
    EffectJobAdded { job: JobId, index: usize },
    MovingEffectJob { job: JobId, from: usize, to: usize },
    EffectJobMoved { job: JobId, from: usize, to: usize },
    RemovingEffectJob { job: JobId, index: usize },
    EffectJobRemoved { job: JobId, index: usize },

    // ==================== Sampler jobs ====================
    AddingSamplerJob { job: JobId, index: usize },
    SamplerJobAdded { job: JobId, index: usize },
    MovingSamplerJob { job: JobId, from: usize, to: usize },
    SamplerJobMoved { job: JobId, from: usize, to: usize },
    RemovingSamplerJob { job: JobId, index: usize },
    SamplerJobRemoved { job: JobId, index: usize },

    // ==================== Zones ====================
    AddingZone { zone: ZoneId, index: usize },
    ZoneAdded { zone: ZoneId, index: usize },
    MovingZone { zone: ZoneId, from: usize, to: usize },
    ZoneMoved { zone: ZoneId, from: usize, to: usize },
    RemovingZone { zone: ZoneId, index: usize },
    ZoneRemoved { zone: ZoneId, index: usize },
    ZoneChanged { zone: ZoneId, field: ZoneField },
    ZoneSelectionChanged { zone: ZoneId, selected: bool },

    // ==================== Selection and focus ====================
    SelectedEffectChanged { effect: Option<EffectId> },
    SelectedTargetChanged { target: Option<TargetId> },
    CurrentEffectJobChanged { job: Option<JobId> },
    CurrentSamplerJobChanged { job: Option<JobId> },
    FocusedComponentChanged { component: Option<ComponentId> },

    // ==================== Menu items ====================
    AddingMenuAction {
        action: MenuActionId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    MenuActionAdded {
        action: MenuActionId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    RemovingMenuAction {
        action: MenuActionId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    MenuActionRemoved {
        action: MenuActionId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    AddingMenuSeparator {
        separator: MenuSeparatorId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    MenuSeparatorAdded {
        separator: MenuSeparatorId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    RemovingMenuSeparator {
        separator: MenuSeparatorId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },
    MenuSeparatorRemoved {
        separator: MenuSeparatorId,
        location: MenuLocation,
        sub_menus: Vec<String>,
    },

    // ==================== Target building ====================
    BuildingTargets,
    ValidatingTarget { target: TargetId },
    TargetValidationCompleted { target: TargetId, error: Option<String> },
    SavingTarget { target: TargetId },
    TargetSaved { target: TargetId },
    TargetSaveError { target: TargetId, message: String },
    TargetBuildingCompleted,

    // ==================== Participants ====================
    AddingParticipant {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    ParticipantAdded {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    ActivatingParticipant {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    ParticipantActivated {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    DeactivatingParticipant {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    ParticipantDeactivated {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    RemovingParticipant {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },
    ParticipantRemoved {
        participant: ParticipantKey,
        parent: Option<ParticipantKey>,
        id: ParticipantId,
    },

    // ==================== Property visibility ====================
    AftertouchVisibilityChanged { visible: bool },
    ChannelVisibilityChanged { visible: bool },
    ChannelPressureVisibilityChanged { visible: bool },
    ControlVisibilityChanged { control: MidiData, visible: bool },
    DrySampleVisibilityChanged { visible: bool },
    NoteVisibilityChanged { visible: bool },
    ReleaseTimeVisibilityChanged { visible: bool },
    SampleTimeVisibilityChanged { visible: bool },
    StatusVisibilityChanged { visible: bool },
    VelocityVisibilityChanged { visible: bool },
    WetSampleVisibilityChanged { visible: bool },

    // ==================== Session ====================
    SampleChannelCountChanged { count: SampleChannelCount },
    SampleRateChanged { rate: Option<SampleRate> },
    /// Session lifecycle transition, as published by the session.
    StateChanged {
        state: SessionState,
        directory: Option<PathBuf>,
    },
    /// Session lifecycle transition, as published by a context.
    SessionStateChanged {
        state: SessionState,
        directory: Option<PathBuf>,
    },
    ErrorReported { message: String },
}

impl SessionEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// Visibility event for a zone field.
    pub(crate) fn visibility(field: ZoneField, visible: bool) -> Self {
        match field {
            ZoneField::Aftertouch => Self::AftertouchVisibilityChanged { visible },
            ZoneField::Channel => Self::ChannelVisibilityChanged { visible },
            ZoneField::ChannelPressure => Self::ChannelPressureVisibilityChanged { visible },
            ZoneField::Control(control) => Self::ControlVisibilityChanged { control, visible },
            ZoneField::DrySample => Self::DrySampleVisibilityChanged { visible },
            ZoneField::Note => Self::NoteVisibilityChanged { visible },
            ZoneField::ReleaseTime => Self::ReleaseTimeVisibilityChanged { visible },
            ZoneField::SampleTime => Self::SampleTimeVisibilityChanged { visible },
            ZoneField::Status => Self::StatusVisibilityChanged { visible },
            ZoneField::Velocity => Self::VelocityVisibilityChanged { visible },
            ZoneField::WetSample => Self::WetSampleVisibilityChanged { visible },
        }
    }
}

impl EventKind {
    /// Event name, for logging.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_event_kind() {
        let event = SessionEvent::EffectAdded {
            effect: EffectId::new(3),
            index: 0,
        };
        assert_eq!(event.kind(), EventKind::EffectAdded);
        assert_eq!(EventKind::EffectAdded.name(), "EffectAdded");
    }

    #[test]
    fn test_every_field_has_a_visibility_event() {
        let kinds: Vec<EventKind> = [
            ZoneField::Aftertouch,
            ZoneField::Channel,
            ZoneField::ChannelPressure,
            ZoneField::Control(1),
            ZoneField::DrySample,
            ZoneField::Note,
            ZoneField::ReleaseTime,
            ZoneField::SampleTime,
            ZoneField::Status,
            ZoneField::Velocity,
            ZoneField::WetSample,
        ]
        .into_iter()
        .map(|f| SessionEvent::visibility(f, true).kind())
        .collect();
        let mut unique = kinds.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_notification_surface_size() {
        assert_eq!(EventKind::COUNT, EventKind::iter().count());
        assert!(EventKind::COUNT >= 80);
    }
}
