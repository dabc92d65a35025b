//! Session authority and plugin context facade for synthclone.
//!
//! The [`Session`] owns every collection (participants, effects, the sampler,
//! targets, zones, jobs and menu items) and is the only place they change.
//! Each active participant talks to it through a [`Context`], which forwards
//! every call to the session, remembers what was created through it, and
//! removes those objects again when the participant is deactivated.
//!
//! Every add returns a [`Registration`] that fires exactly once when its
//! subject is removed. Change notifications are published on an [`EventBus`];
//! contexts relay them to their own listeners only while someone listens.

mod bus;
mod component;
mod context;
mod event;
mod job;
mod menu;
mod participant;
mod registration;
mod relay;
mod session;

pub use bus::{EventBus, SubscriptionId};
pub use component::{
    Component, ComponentCore, ComponentId, ComponentStatus, Effect, Sampler, Target,
};
pub use context::Context;
pub use event::{EventKind, SessionEvent};
pub use job::{
    EffectJob, Job, JobCompletion, JobOutcome, JobReporter, SamplerJob, SamplerJobRequest,
    SamplerJobType,
};
pub use menu::{Menu, MenuAction, MenuLocation, MenuSeparator};
pub use participant::{Participant, ParticipantInfo};
pub use registration::{Registrable, Registration};
pub use relay::{relabel, relay_source};
pub use session::Session;

pub use synthclone_core::{
    ComponentError, EffectId, JobId, MenuActionId, MenuSeparatorId, ParticipantId,
    ParticipantKey, SamplerId, SessionError, SessionResult, SessionState, TargetId, ZoneId,
};
