//! Per-participant access to the session.
//!
//! A [`Context`] forwards every call to the [`Session`]. Objects added through
//! it are recorded in its ledger and pruned from the ledger when their
//! registration fires, wherever the removal came from. Deactivating the
//! participant closes the context, which removes whatever is still recorded.
//!
//! Session events are relayed to the context's own listeners only while at
//! least one listener is subscribed to the kind in question.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use synthclone_core::{
    EffectId, JobId, MAJOR_VERSION, MINOR_VERSION, MenuActionId, MenuSeparatorId, ParticipantId,
    ParticipantKey, PropertyVisibility, REVISION, SampleChannelCount, SampleRate, SamplerId,
    SessionResult, SessionState, TargetId, Zone, ZoneComparer, ZoneField, ZoneId, ZoneValue,
};

use crate::bus::{EventBus, SubscriptionId};
use crate::component::{ComponentId, Effect, Sampler, Target};
use crate::event::{EventKind, SessionEvent};
use crate::job::{EffectJob, SamplerJob, SamplerJobType};
use crate::menu::{MenuAction, MenuLocation, MenuSeparator};
use crate::participant::Participant;
use crate::registration::{Registrable, Registration};
use crate::relay::{relabel, relay_source};
use crate::session::Session;

/// Handles created through a context, oldest first.
#[derive(Debug, Clone, Default)]
struct Ledger {
    participants: Vec<ParticipantKey>,
    samplers: Vec<SamplerId>,
    effects: Vec<EffectId>,
    targets: Vec<TargetId>,
    menu_actions: Vec<MenuActionId>,
    menu_separators: Vec<MenuSeparatorId>,
}

impl Ledger {
    fn is_empty(&self) -> bool {
        self.participants.is_empty()
            && self.samplers.is_empty()
            && self.effects.is_empty()
            && self.targets.is_empty()
            && self.menu_actions.is_empty()
            && self.menu_separators.is_empty()
    }
}

/// Handle kinds a context keeps in its ledger.
trait Tracked: Registrable {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self>;
}

impl Tracked for ParticipantKey {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.participants
    }
}

impl Tracked for SamplerId {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.samplers
    }
}

impl Tracked for EffectId {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.effects
    }
}

impl Tracked for TargetId {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.targets
    }
}

impl Tracked for MenuActionId {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.menu_actions
    }
}

impl Tracked for MenuSeparatorId {
    fn list(ledger: &mut Ledger) -> &mut Vec<Self> {
        &mut ledger.menu_separators
    }
}

struct ContextState {
    session: Weak<Session>,
    participant: ParticipantKey,
    id: ParticipantId,
    ledger: RefCell<Ledger>,
    bus: EventBus,
    /// Forwarders attached to the session bus, one per relayed kind.
    relays: RefCell<HashMap<EventKind, SubscriptionId>>,
    closed: Cell<bool>,
}

/// The session as seen by one active participant.
///
/// Cloning a context yields another handle to the same ledger and
/// listeners.
///
/// # Panics
///
/// Every method that reaches the session panics once the participant has
/// been deactivated.
#[derive(Clone)]
pub struct Context {
    state: Rc<ContextState>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("participant", &self.state.id)
            .field("ledger", &*self.state.ledger.borrow())
            .field("relays", &self.state.relays.borrow().len())
            .field("closed", &self.state.closed.get())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(session: Weak<Session>, participant: ParticipantKey, id: ParticipantId) -> Self {
        Self {
            state: Rc::new(ContextState {
                session,
                participant,
                id,
                ledger: RefCell::new(Ledger::default()),
                bus: EventBus::new(),
                relays: RefCell::new(HashMap::new()),
                closed: Cell::new(false),
            }),
        }
    }

    /// The participant this context belongs to.
    pub fn participant(&self) -> ParticipantKey {
        self.state.participant
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.state.id
    }

    /// Check whether the participant has been deactivated.
    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }

    fn session(&self) -> Rc<Session> {
        assert!(
            !self.state.closed.get(),
            "context of participant '{}' used after deactivation",
            self.state.id
        );
        match self.state.session.upgrade() {
            Some(session) => session,
            None => panic!("session of participant '{}' is gone", self.state.id),
        }
    }

    fn track<H: Tracked>(&self, registration: &Registration<H>) {
        if registration.is_unregistered() {
            return;
        }
        H::list(&mut self.state.ledger.borrow_mut()).push(registration.id());
        let state = Rc::downgrade(&self.state);
        registration.on_unregistered(move |id, _| {
            if let Some(state) = state.upgrade() {
                H::list(&mut state.ledger.borrow_mut()).retain(|h| *h != id);
            }
        });
    }

    // ==================== Participants ====================

    /// Register a child participant with id `<this id>.<sub_id>`.
    ///
    /// # Panics
    ///
    /// Panics if `sub_id` is malformed, the resulting id is taken, or the
    /// participant is already registered.
    pub fn add_participant(
        &self,
        participant: Rc<dyn Participant>,
        sub_id: &str,
    ) -> Registration<ParticipantKey> {
        let registration =
            self.session()
                .add_participant(participant, Some(self.state.participant), sub_id);
        self.track(&registration);
        tracing::debug!(target: "context", participant = %self.state.id, child = sub_id, "child participant added");
        registration
    }

    pub fn remove_participant(&self, key: ParticipantKey) {
        self.session().remove_participant(key);
    }

    pub fn participant_id_of(&self, key: ParticipantKey) -> Option<ParticipantId> {
        self.session().participant_id(key)
    }

    /// Number of participants directly under `parent` (roots for `None`).
    pub fn participant_count(&self, parent: Option<ParticipantKey>) -> usize {
        self.session().participant_count(parent)
    }

    pub fn participant_at(
        &self,
        index: usize,
        parent: Option<ParticipantKey>,
    ) -> Option<ParticipantKey> {
        self.session().participant_at(index, parent)
    }

    pub fn participant_index(&self, key: ParticipantKey) -> Option<usize> {
        self.session().participant_index(key)
    }

    // ==================== Effects ====================

    /// Add an effect at `index` (appended for `None`), created by this
    /// participant.
    ///
    /// # Panics
    ///
    /// Panics if the effect is already registered or `index` is past the end.
    pub fn add_effect(&self, effect: Arc<dyn Effect>, index: Option<usize>) -> Registration<EffectId> {
        let registration = self
            .session()
            .insert_effect(effect, index, self.state.participant);
        self.track(&registration);
        registration
    }

    pub fn remove_effect(&self, id: EffectId) {
        self.session().remove_effect(id);
    }

    pub fn remove_effect_at(&self, index: usize) {
        self.session().remove_effect_at(index);
    }

    pub fn effect(&self, id: EffectId) -> Option<Arc<dyn Effect>> {
        self.session().effect(id)
    }

    pub fn effect_at(&self, index: usize) -> Option<EffectId> {
        self.session().effect_at(index)
    }

    pub fn effect_count(&self) -> usize {
        self.session().effect_count()
    }

    pub fn effect_index(&self, id: EffectId) -> Option<usize> {
        self.session().effect_index(id)
    }

    pub fn move_effect(&self, from: usize, to: usize) {
        self.session().move_effect(from, to);
    }

    // ==================== Sampler ====================

    /// Register the sampler.
    ///
    /// Fails with [`SessionError::SamplerAlreadyRegistered`](synthclone_core::SessionError::SamplerAlreadyRegistered) while another
    /// sampler is registered, leaving the session unchanged.
    ///
    /// # Panics
    ///
    /// Panics if this sampler is the one already registered.
    pub fn add_sampler(&self, sampler: Arc<dyn Sampler>) -> SessionResult<Registration<SamplerId>> {
        let registration = self
            .session()
            .insert_sampler(sampler, self.state.participant)?;
        self.track(&registration);
        Ok(registration)
    }

    pub fn remove_sampler(&self, id: SamplerId) {
        self.session().remove_sampler(id);
    }

    pub fn sampler(&self) -> Option<Arc<dyn Sampler>> {
        self.session().sampler()
    }

    pub fn sampler_id(&self) -> Option<SamplerId> {
        self.session().sampler_id()
    }

    // ==================== Targets ====================

    /// Add a target at `index` (appended for `None`).
    ///
    /// # Panics
    ///
    /// Panics if the target is already registered or `index` is past the end.
    pub fn add_target(&self, target: Arc<dyn Target>, index: Option<usize>) -> Registration<TargetId> {
        let registration = self
            .session()
            .insert_target(target, index, self.state.participant);
        self.track(&registration);
        registration
    }

    pub fn remove_target(&self, id: TargetId) {
        self.session().remove_target(id);
    }

    pub fn remove_target_at(&self, index: usize) {
        self.session().remove_target_at(index);
    }

    pub fn target(&self, id: TargetId) -> Option<Arc<dyn Target>> {
        self.session().target(id)
    }

    pub fn target_at(&self, index: usize) -> Option<TargetId> {
        self.session().target_at(index)
    }

    pub fn target_count(&self) -> usize {
        self.session().target_count()
    }

    pub fn target_index(&self, id: TargetId) -> Option<usize> {
        self.session().target_index(id)
    }

    pub fn move_target(&self, from: usize, to: usize) {
        self.session().move_target(from, to);
    }

    /// Validate and save every target. See [`Session::build_targets`].
    pub fn build_targets(&self) {
        self.session().build_targets();
    }

    // ==================== Menu items ====================

    /// Add a menu action at `location`, nested under `sub_menus`.
    ///
    /// # Panics
    ///
    /// Panics if the action is already registered or `location` names an
    /// unregistered component.
    pub fn add_menu_action(
        &self,
        action: Rc<MenuAction>,
        location: impl Into<MenuLocation>,
        sub_menus: &[&str],
    ) -> Registration<MenuActionId> {
        let registration = self.session().insert_menu_action(
            action,
            location.into(),
            sub_menus,
            self.state.participant,
        );
        self.track(&registration);
        registration
    }

    pub fn remove_menu_action(&self, id: MenuActionId) {
        self.session().remove_menu_action(id);
    }

    pub fn menu_action(&self, id: MenuActionId) -> Option<Rc<MenuAction>> {
        self.session().menu_action(id)
    }

    pub fn menu_actions(&self, location: MenuLocation) -> Vec<MenuActionId> {
        self.session().menu_actions(location)
    }

    pub fn add_menu_separator(
        &self,
        separator: Rc<MenuSeparator>,
        location: impl Into<MenuLocation>,
        sub_menus: &[&str],
    ) -> Registration<MenuSeparatorId> {
        let registration = self.session().insert_menu_separator(
            separator,
            location.into(),
            sub_menus,
            self.state.participant,
        );
        self.track(&registration);
        registration
    }

    pub fn remove_menu_separator(&self, id: MenuSeparatorId) {
        self.session().remove_menu_separator(id);
    }

    pub fn menu_separator(&self, id: MenuSeparatorId) -> Option<Rc<MenuSeparator>> {
        self.session().menu_separator(id)
    }

    // ==================== Zones ====================

    pub fn add_zone(&self, index: Option<usize>) -> Registration<ZoneId> {
        self.session().add_zone(index)
    }

    pub fn remove_zone(&self, id: ZoneId) {
        self.session().remove_zone(id);
    }

    pub fn remove_zone_at(&self, index: usize) {
        self.session().remove_zone_at(index);
    }

    pub fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.session().zone(id)
    }

    pub fn zone_at(&self, index: usize) -> Option<ZoneId> {
        self.session().zone_at(index)
    }

    pub fn zone_count(&self) -> usize {
        self.session().zone_count()
    }

    pub fn zone_index(&self, id: ZoneId) -> Option<usize> {
        self.session().zone_index(id)
    }

    pub fn move_zone(&self, from: usize, to: usize) {
        self.session().move_zone(from, to);
    }

    pub fn set_zone_property(&self, id: ZoneId, value: ZoneValue) -> SessionResult<()> {
        self.session().set_zone_property(id, value)
    }

    pub fn sort_zones(&self, comparer: &dyn ZoneComparer, ascending: bool) {
        self.session().sort_zones(comparer, ascending);
    }

    pub fn is_zone_selected(&self, id: ZoneId) -> bool {
        self.session().is_zone_selected(id)
    }

    pub fn set_zone_selected(&self, id: ZoneId, selected: bool) {
        self.session().set_zone_selected(id, selected);
    }

    pub fn set_all_zones_selected(&self, selected: bool) {
        self.session().set_all_zones_selected(selected);
    }

    pub fn selected_zone_count(&self) -> usize {
        self.session().selected_zone_count()
    }

    pub fn selected_zone(&self, index: usize) -> Option<ZoneId> {
        self.session().selected_zone(index)
    }

    // ==================== Jobs ====================

    /// Queue an effect job for `zone` at `index` (appended for `None`).
    ///
    /// # Panics
    ///
    /// Panics if `zone` does not exist or `index` is past the end.
    pub fn add_effect_job(&self, zone: ZoneId, index: Option<usize>) -> Registration<JobId> {
        self.session()
            .insert_effect_job(zone, index, self.state.participant)
    }

    pub fn remove_effect_job(&self, id: JobId) {
        self.session().remove_effect_job(id);
    }

    pub fn effect_job(&self, id: JobId) -> Option<EffectJob> {
        self.session().effect_job(id)
    }

    pub fn effect_job_count(&self) -> usize {
        self.session().effect_job_count()
    }

    pub fn effect_job_index(&self, id: JobId) -> Option<usize> {
        self.session().effect_job_index(id)
    }

    /// Queue a sampler job for `zone` at `index` (appended for `None`).
    pub fn add_sampler_job(
        &self,
        kind: SamplerJobType,
        zone: ZoneId,
        index: Option<usize>,
    ) -> Registration<JobId> {
        self.session()
            .insert_sampler_job(kind, zone, index, self.state.participant)
    }

    pub fn remove_sampler_job(&self, id: JobId) {
        self.session().remove_sampler_job(id);
    }

    pub fn sampler_job(&self, id: JobId) -> Option<SamplerJob> {
        self.session().sampler_job(id)
    }

    pub fn sampler_job_count(&self) -> usize {
        self.session().sampler_job_count()
    }

    pub fn sampler_job_index(&self, id: JobId) -> Option<usize> {
        self.session().sampler_job_index(id)
    }

    pub fn current_sampler_job(&self) -> Option<JobId> {
        self.session().current_sampler_job()
    }

    pub fn abort_current_sampler_job(&self) -> bool {
        self.session().abort_current_sampler_job()
    }

    // ==================== Visibility, selection and focus ====================

    pub fn visibility(&self) -> PropertyVisibility {
        self.session().visibility()
    }

    pub fn is_property_visible(&self, field: ZoneField) -> bool {
        self.session().is_property_visible(field)
    }

    pub fn set_property_visible(&self, field: ZoneField, visible: bool) {
        self.session().set_property_visible(field, visible);
    }

    pub fn selected_effect(&self) -> Option<EffectId> {
        self.session().selected_effect()
    }

    pub fn set_selected_effect(&self, effect: Option<EffectId>) {
        self.session().set_selected_effect(effect);
    }

    pub fn selected_target(&self) -> Option<TargetId> {
        self.session().selected_target()
    }

    pub fn set_selected_target(&self, target: Option<TargetId>) {
        self.session().set_selected_target(target);
    }

    pub fn focused_component(&self) -> Option<ComponentId> {
        self.session().focused_component()
    }

    pub fn set_focused_component(&self, component: Option<ComponentId>) {
        self.session().set_focused_component(component);
    }

    // ==================== Session control ====================

    pub fn session_state(&self) -> SessionState {
        self.session().state()
    }

    pub fn session_directory(&self) -> Option<PathBuf> {
        self.session().directory()
    }

    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.session().sample_rate()
    }

    pub fn set_sample_rate(&self, hz: Option<u32>) -> SessionResult<()> {
        self.session().set_sample_rate(hz)
    }

    pub fn sample_channel_count(&self) -> SampleChannelCount {
        self.session().sample_channel_count()
    }

    pub fn set_sample_channel_count(&self, count: SampleChannelCount) -> SessionResult<()> {
        self.session().set_sample_channel_count(count)
    }

    pub fn set_session_modified(&self) {
        self.session().set_session_modified();
    }

    pub fn save_session(&self) -> SessionResult<()> {
        self.session().save_session()
    }

    pub fn save_session_as(&self, dir: &Path) -> SessionResult<()> {
        self.session().save_session_as(dir)
    }

    pub fn quit_session(&self) -> SessionResult<()> {
        self.session().quit_session()
    }

    /// Report a recoverable error to the user.
    pub fn report_error(&self, message: impl Into<String>) {
        self.session().report_error(message);
    }

    pub fn major_version(&self) -> u32 {
        MAJOR_VERSION
    }

    pub fn minor_version(&self) -> u32 {
        MINOR_VERSION
    }

    pub fn revision(&self) -> u32 {
        REVISION
    }

    // ==================== Relayed events ====================

    /// Listen to `kind` on this context.
    ///
    /// The first listener of a kind attaches a forwarder to the session bus;
    /// later listeners share it.
    ///
    /// # Panics
    ///
    /// Panics if contexts do not publish `kind`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + 'static,
    ) -> SubscriptionId {
        let Some(source) = relay_source(kind) else {
            panic!("contexts do not publish {} events", kind.name());
        };
        let session = self.session();
        let subscription = self.state.bus.subscribe(kind, listener);
        if self.state.bus.listener_count(kind) == 1 {
            let state = Rc::downgrade(&self.state);
            let forwarder = session.subscribe(source, move |event| {
                if let Some(state) = state.upgrade() {
                    state.bus.emit(&relabel(event, kind));
                }
            });
            self.state.relays.borrow_mut().insert(kind, forwarder);
            tracing::debug!(target: "relay", participant = %self.state.id, event = kind.name(), "relay attached");
        }
        subscription
    }

    /// Stop listening. The last listener of a kind detaches its forwarder.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let kind = subscription.kind();
        let removed = self.state.bus.unsubscribe(subscription);
        if removed && !self.state.bus.has_listeners(kind) {
            self.detach_relay(kind);
        }
        removed
    }

    /// Check whether a forwarder for `kind` is attached to the session bus.
    pub fn is_relaying(&self, kind: EventKind) -> bool {
        self.state.relays.borrow().contains_key(&kind)
    }

    fn detach_relay(&self, kind: EventKind) {
        let forwarder = self.state.relays.borrow_mut().remove(&kind);
        if let (Some(forwarder), Some(session)) = (forwarder, self.state.session.upgrade()) {
            session.unsubscribe(forwarder);
            tracing::debug!(target: "relay", participant = %self.state.id, event = kind.name(), "relay detached");
        }
    }

    // ==================== Teardown ====================

    /// Remove everything still recorded in the ledger and detach all relays.
    ///
    /// Child participants go first, then the sampler, effects and targets
    /// (highest index first), then menu actions and separators.
    ///
    /// # Panics
    ///
    /// Panics if anything is still recorded afterwards.
    pub(crate) fn close(&self, session: &Session) {
        let ledger = self.state.ledger.borrow().clone();
        tracing::debug!(target: "context", participant = %self.state.id, ?ledger, "closing context");

        for key in ledger.participants.into_iter().rev() {
            if session.has_participant(key) {
                session.remove_participant(key);
            }
        }
        for id in ledger.samplers.into_iter().rev() {
            if session.sampler_id() == Some(id) {
                session.remove_sampler(id);
            }
        }
        for id in by_index_descending(&ledger.effects, |id| session.effect_index(id)) {
            if session.effect_index(id).is_some() {
                session.remove_effect(id);
            }
        }
        for id in by_index_descending(&ledger.targets, |id| session.target_index(id)) {
            if session.target_index(id).is_some() {
                session.remove_target(id);
            }
        }
        for id in ledger.menu_actions.into_iter().rev() {
            if session.menu_action(id).is_some() {
                session.remove_menu_action(id);
            }
        }
        for id in ledger.menu_separators.into_iter().rev() {
            if session.menu_separator(id).is_some() {
                session.remove_menu_separator(id);
            }
        }

        {
            let ledger = self.state.ledger.borrow();
            assert!(
                ledger.is_empty(),
                "context of participant '{}' still tracks objects after teardown: {ledger:?}",
                self.state.id
            );
        }

        let relays: Vec<_> = self.state.relays.borrow_mut().drain().collect();
        for (kind, forwarder) in relays {
            session.unsubscribe(forwarder);
            tracing::debug!(target: "relay", participant = %self.state.id, event = kind.name(), "relay detached");
        }
        self.state.bus.clear();
        self.state.closed.set(true);
        tracing::debug!(target: "context", participant = %self.state.id, "context closed");
    }
}

fn by_index_descending<H: Copy>(ids: &[H], index: impl Fn(H) -> Option<usize>) -> Vec<H> {
    let mut ids: Vec<(usize, H)> = ids
        .iter()
        .filter_map(|id| Some((index(*id)?, *id)))
        .collect();
    ids.sort_by(|a, b| b.0.cmp(&a.0));
    ids.into_iter().map(|(_, id)| id).collect()
}
