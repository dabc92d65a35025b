//! Participants, components and menu items.

use std::ptr;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use synthclone_core::{
    EffectId, MenuActionId, MenuSeparatorId, ParticipantId, ParticipantKey, SamplerId,
    SessionError, SessionResult, TargetId, ZoneField,
};

use super::Session;
use super::data::{Entry, MenuEntry, ParticipantEntry, check_index, insert_position};
use crate::component::{ComponentId, Effect, Sampler, Target};
use crate::context::Context;
use crate::event::SessionEvent;
use crate::menu::{MenuAction, MenuLocation, MenuSeparator};
use crate::participant::Participant;
use crate::registration::Registration;

impl Session {
    // ==================== Participants ====================

    /// Register a participant under `parent`.
    ///
    /// Root participants (`parent == None`) use `sub_id` as their full,
    /// possibly dotted, id; children get `<parent id>.<sub_id>`.
    ///
    /// # Panics
    ///
    /// Panics if the id is malformed or taken, if `parent` is unknown, or if
    /// `participant` is already registered.
    pub fn add_participant(
        &self,
        participant: Rc<dyn Participant>,
        parent: Option<ParticipantKey>,
        sub_id: &str,
    ) -> Registration<ParticipantKey> {
        self.begin_change("add a participant");
        let id = {
            let data = self.data.borrow();
            assert!(
                !data
                    .participants
                    .values()
                    .any(|e| ptr::addr_eq(Rc::as_ptr(&e.participant), Rc::as_ptr(&participant))),
                "participant '{sub_id}' is already registered"
            );
            let id = match parent {
                None => ParticipantId::parse(sub_id),
                Some(parent) => match data.participants.get(&parent) {
                    Some(entry) => entry.id.child(sub_id),
                    None => panic!("unknown parent participant {parent}"),
                },
            };
            let id = id.unwrap_or_else(|err| panic!("{err}"));
            assert!(
                !data.participants.values().any(|e| e.id == id),
                "participant id '{id}' is already registered"
            );
            id
        };

        let key: ParticipantKey = self.handles.allocate();
        self.announce(SessionEvent::AddingParticipant {
            participant: key,
            parent,
            id: id.clone(),
        });
        let registration = Registration::new(key);
        {
            let mut data = self.data.borrow_mut();
            // A record loaded before this participant was registered.
            let saved_state = match data.orphans.participants.iter().position(|r| r.id == id) {
                Some(index) => data.orphans.participants.remove(index).state,
                None => Value::Null,
            };
            data.participants.insert(
                key,
                ParticipantEntry {
                    participant,
                    id: id.clone(),
                    parent,
                    active: false,
                    saved_state,
                    registration: registration.clone(),
                },
            );
        }
        tracing::info!(target: "session", participant = %id, "participant added");
        self.emit(SessionEvent::ParticipantAdded {
            participant: key,
            parent,
            id,
        });
        registration
    }

    /// Remove a participant, deactivating it and removing its children first.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not registered.
    pub fn remove_participant(&self, key: ParticipantKey) {
        self.begin_change("remove a participant");
        let (id, parent, active) = self.participant_summary(key);
        tracing::debug!(target: "session", participant = %id, "removing participant");
        if active {
            self.deactivate_participant(key);
        }
        let children: Vec<ParticipantKey> = self
            .data
            .borrow()
            .participants
            .iter()
            .filter(|(_, e)| e.parent == Some(key))
            .map(|(k, _)| *k)
            .collect();
        for child in children.into_iter().rev() {
            if self.has_participant(child) {
                self.remove_participant(child);
            }
        }

        self.announce(SessionEvent::RemovingParticipant {
            participant: key,
            parent,
            id: id.clone(),
        });
        let entry = self.data.borrow_mut().participants.shift_remove(&key);
        if let Some(entry) = entry {
            entry.registration.fire(&entry.participant);
        }
        tracing::info!(target: "session", participant = %id, "participant removed");
        self.emit(SessionEvent::ParticipantRemoved {
            participant: key,
            parent,
            id,
        });
    }

    /// Activate a participant with the state saved for it.
    ///
    /// # Panics
    ///
    /// Panics if `key` is unknown or already active.
    pub fn activate_participant(&self, key: ParticipantKey) {
        let state = self
            .data
            .borrow()
            .participants
            .get(&key)
            .map(|e| e.saved_state.clone())
            .unwrap_or_default();
        self.activate_participant_with(key, state);
    }

    pub(crate) fn activate_participant_with(&self, key: ParticipantKey, state: Value) {
        self.begin_change("activate a participant");
        let (id, parent, active) = self.participant_summary(key);
        assert!(!active, "participant '{id}' is already active");

        self.announce(SessionEvent::ActivatingParticipant {
            participant: key,
            parent,
            id: id.clone(),
        });
        let context = Context::new(self.this.clone(), key, id.clone());
        let participant = {
            let mut data = self.data.borrow_mut();
            let entry = participant_entry(&mut data.participants, key);
            entry.active = true;
            Rc::clone(&entry.participant)
        };
        self.contexts.borrow_mut().insert(key, context.clone());
        participant.activate(&context, &state);
        tracing::info!(target: "session", participant = %id, "participant activated");
        self.emit(SessionEvent::ParticipantActivated {
            participant: key,
            parent,
            id,
        });
    }

    /// Deactivate a participant, removing everything created through its
    /// context.
    ///
    /// # Panics
    ///
    /// Panics if `key` is unknown or not active.
    pub fn deactivate_participant(&self, key: ParticipantKey) {
        self.begin_change("deactivate a participant");
        let (id, parent, active) = self.participant_summary(key);
        assert!(active, "participant '{id}' is not active");

        self.announce(SessionEvent::DeactivatingParticipant {
            participant: key,
            parent,
            id: id.clone(),
        });
        let context = self.contexts.borrow().get(&key).cloned();
        let participant = self.participant(key);
        if let (Some(context), Some(participant)) = (context, participant) {
            participant.deactivate(&context);
            let state = participant.state();
            context.close(self);
            if let Some(entry) = self.data.borrow_mut().participants.get_mut(&key) {
                entry.saved_state = state;
            }
        }
        self.contexts.borrow_mut().remove(&key);
        if let Some(entry) = self.data.borrow_mut().participants.get_mut(&key) {
            entry.active = false;
        }
        tracing::info!(target: "session", participant = %id, "participant deactivated");
        self.emit(SessionEvent::ParticipantDeactivated {
            participant: key,
            parent,
            id,
        });
    }

    fn participant_summary(&self, key: ParticipantKey) -> (ParticipantId, Option<ParticipantKey>, bool) {
        let data = self.data.borrow();
        match data.participants.get(&key) {
            Some(entry) => (entry.id.clone(), entry.parent, entry.active),
            None => panic!("unknown participant {key}"),
        }
    }

    pub fn has_participant(&self, key: ParticipantKey) -> bool {
        self.data.borrow().participants.contains_key(&key)
    }

    pub fn participant(&self, key: ParticipantKey) -> Option<Rc<dyn Participant>> {
        self.data
            .borrow()
            .participants
            .get(&key)
            .map(|e| Rc::clone(&e.participant))
    }

    pub fn participant_id(&self, key: ParticipantKey) -> Option<ParticipantId> {
        self.data.borrow().participants.get(&key).map(|e| e.id.clone())
    }

    pub fn participant_parent(&self, key: ParticipantKey) -> Option<ParticipantKey> {
        self.data
            .borrow()
            .participants
            .get(&key)
            .and_then(|e| e.parent)
    }

    pub fn is_participant_active(&self, key: ParticipantKey) -> bool {
        self.data
            .borrow()
            .participants
            .get(&key)
            .is_some_and(|e| e.active)
    }

    /// Find a participant by its full id.
    pub fn find_participant(&self, id: &str) -> Option<ParticipantKey> {
        self.data
            .borrow()
            .participants
            .iter()
            .find(|(_, e)| e.id.as_str() == id)
            .map(|(k, _)| *k)
    }

    /// Number of participants directly under `parent` (roots for `None`).
    pub fn participant_count(&self, parent: Option<ParticipantKey>) -> usize {
        self.data
            .borrow()
            .participants
            .values()
            .filter(|e| e.parent == parent)
            .count()
    }

    /// The `index`-th participant directly under `parent`.
    pub fn participant_at(
        &self,
        index: usize,
        parent: Option<ParticipantKey>,
    ) -> Option<ParticipantKey> {
        self.data
            .borrow()
            .participants
            .iter()
            .filter(|(_, e)| e.parent == parent)
            .nth(index)
            .map(|(k, _)| *k)
    }

    /// Position of a participant among its siblings.
    pub fn participant_index(&self, key: ParticipantKey) -> Option<usize> {
        let data = self.data.borrow();
        let parent = data.participants.get(&key)?.parent;
        data.participants
            .iter()
            .filter(|(_, e)| e.parent == parent)
            .position(|(k, _)| *k == key)
    }

    /// Every registered participant, in registration order.
    pub fn participant_keys(&self) -> Vec<ParticipantKey> {
        self.data.borrow().participants.keys().copied().collect()
    }

    // ==================== Effects ====================

    pub(crate) fn insert_effect(
        &self,
        effect: Arc<dyn Effect>,
        index: Option<usize>,
        creator: ParticipantKey,
    ) -> Registration<EffectId> {
        self.begin_change("add an effect");
        let index = {
            let data = self.data.borrow();
            assert!(
                !data
                    .effects
                    .values()
                    .any(|e| ptr::addr_eq(Arc::as_ptr(&e.object), Arc::as_ptr(&effect))),
                "effect '{}' is already registered",
                effect.name()
            );
            insert_position(index, data.effects.len(), "effect")
        };

        let id: EffectId = self.handles.allocate();
        self.announce(SessionEvent::AddingEffect { effect: id, index });
        let registration = Registration::new(id);
        self.data.borrow_mut().effects.shift_insert(
            index,
            id,
            Entry {
                object: effect,
                creator,
                registration: registration.clone(),
            },
        );
        tracing::debug!(target: "session", effect = %id, index, "effect added");
        self.emit(SessionEvent::EffectAdded { effect: id, index });
        self.mark_wet_samples_stale();
        self.touch();
        registration
    }

    pub fn effect(&self, id: EffectId) -> Option<Arc<dyn Effect>> {
        self.data
            .borrow()
            .effects
            .get(&id)
            .map(|e| Arc::clone(&e.object))
    }

    pub fn effect_at(&self, index: usize) -> Option<EffectId> {
        self.data.borrow().effects.get_index(index).map(|(k, _)| *k)
    }

    pub fn effect_count(&self) -> usize {
        self.data.borrow().effects.len()
    }

    pub fn effect_index(&self, id: EffectId) -> Option<usize> {
        self.data.borrow().effects.get_index_of(&id)
    }

    /// Participant that created the effect.
    pub fn effect_creator(&self, id: EffectId) -> Option<ParticipantKey> {
        self.data.borrow().effects.get(&id).map(|e| e.creator)
    }

    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn move_effect(&self, from: usize, to: usize) {
        self.begin_change("move an effect");
        let id = {
            let data = self.data.borrow();
            check_index(to, data.effects.len(), "effect");
            match data.effects.get_index(from) {
                Some((id, _)) => *id,
                None => panic!("effect index {from} is out of range"),
            }
        };
        if from == to {
            return;
        }
        self.announce(SessionEvent::MovingEffect { effect: id, from, to });
        self.data.borrow_mut().effects.move_index(from, to);
        self.emit(SessionEvent::EffectMoved { effect: id, from, to });
        self.mark_wet_samples_stale();
        self.touch();
    }

    /// Remove an effect and the menu items scoped to it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn remove_effect(&self, id: EffectId) {
        self.begin_change("remove an effect");
        assert!(
            self.data.borrow().effects.contains_key(&id),
            "unknown effect {id}"
        );
        self.remove_scoped_menu_items(MenuLocation::Effect(id));
        if self.selected_effect() == Some(id) {
            self.set_selected_effect(None);
        }
        self.clear_focus_of(ComponentId::Effect(id));

        let index = self.effect_index(id).unwrap_or_default();
        self.announce(SessionEvent::RemovingEffect { effect: id, index });
        let entry = self.data.borrow_mut().effects.shift_remove(&id);
        if let Some(entry) = entry {
            entry.registration.fire(&entry.object);
        }
        tracing::debug!(target: "session", effect = %id, index, "effect removed");
        self.emit(SessionEvent::EffectRemoved { effect: id, index });
        self.mark_wet_samples_stale();
        self.touch();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove_effect_at(&self, index: usize) {
        let id = self.effect_at(index);
        match id {
            Some(id) => self.remove_effect(id),
            None => check_index(index, self.effect_count(), "effect"),
        }
    }

    pub fn selected_effect(&self) -> Option<EffectId> {
        self.data.borrow().selected_effect
    }

    /// # Panics
    ///
    /// Panics if `effect` is not registered.
    pub fn set_selected_effect(&self, effect: Option<EffectId>) {
        self.begin_change("select an effect");
        {
            let mut data = self.data.borrow_mut();
            if let Some(id) = effect {
                assert!(data.effects.contains_key(&id), "unknown effect {id}");
            }
            if data.selected_effect == effect {
                return;
            }
            data.selected_effect = effect;
        }
        self.emit(SessionEvent::SelectedEffectChanged { effect });
    }

    // ==================== Targets ====================

    pub(crate) fn insert_target(
        &self,
        target: Arc<dyn Target>,
        index: Option<usize>,
        creator: ParticipantKey,
    ) -> Registration<TargetId> {
        self.begin_change("add a target");
        let index = {
            let data = self.data.borrow();
            assert!(
                !data
                    .targets
                    .values()
                    .any(|e| ptr::addr_eq(Arc::as_ptr(&e.object), Arc::as_ptr(&target))),
                "target '{}' is already registered",
                target.name()
            );
            insert_position(index, data.targets.len(), "target")
        };

        let id: TargetId = self.handles.allocate();
        self.announce(SessionEvent::AddingTarget { target: id, index });
        let registration = Registration::new(id);
        self.data.borrow_mut().targets.shift_insert(
            index,
            id,
            Entry {
                object: target,
                creator,
                registration: registration.clone(),
            },
        );
        tracing::debug!(target: "session", target_id = %id, index, "target added");
        self.emit(SessionEvent::TargetAdded { target: id, index });
        self.touch();
        registration
    }

    pub fn target(&self, id: TargetId) -> Option<Arc<dyn Target>> {
        self.data
            .borrow()
            .targets
            .get(&id)
            .map(|e| Arc::clone(&e.object))
    }

    pub fn target_at(&self, index: usize) -> Option<TargetId> {
        self.data.borrow().targets.get_index(index).map(|(k, _)| *k)
    }

    pub fn target_count(&self) -> usize {
        self.data.borrow().targets.len()
    }

    pub fn target_index(&self, id: TargetId) -> Option<usize> {
        self.data.borrow().targets.get_index_of(&id)
    }

    /// Participant that created the target.
    pub fn target_creator(&self, id: TargetId) -> Option<ParticipantKey> {
        self.data.borrow().targets.get(&id).map(|e| e.creator)
    }

    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn move_target(&self, from: usize, to: usize) {
        self.begin_change("move a target");
        let id = {
            let data = self.data.borrow();
            check_index(to, data.targets.len(), "target");
            match data.targets.get_index(from) {
                Some((id, _)) => *id,
                None => panic!("target index {from} is out of range"),
            }
        };
        if from == to {
            return;
        }
        self.announce(SessionEvent::MovingTarget { target: id, from, to });
        self.data.borrow_mut().targets.move_index(from, to);
        self.emit(SessionEvent::TargetMoved { target: id, from, to });
        self.touch();
    }

    /// Remove a target and the menu items scoped to it.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn remove_target(&self, id: TargetId) {
        self.begin_change("remove a target");
        assert!(
            self.data.borrow().targets.contains_key(&id),
            "unknown target {id}"
        );
        self.remove_scoped_menu_items(MenuLocation::Target(id));
        if self.selected_target() == Some(id) {
            self.set_selected_target(None);
        }
        self.clear_focus_of(ComponentId::Target(id));

        let index = self.target_index(id).unwrap_or_default();
        self.announce(SessionEvent::RemovingTarget { target: id, index });
        let entry = self.data.borrow_mut().targets.shift_remove(&id);
        if let Some(entry) = entry {
            entry.registration.fire(&entry.object);
        }
        tracing::debug!(target: "session", target_id = %id, index, "target removed");
        self.emit(SessionEvent::TargetRemoved { target: id, index });
        self.touch();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove_target_at(&self, index: usize) {
        match self.target_at(index) {
            Some(id) => self.remove_target(id),
            None => check_index(index, self.target_count(), "target"),
        }
    }

    pub fn selected_target(&self) -> Option<TargetId> {
        self.data.borrow().selected_target
    }

    /// # Panics
    ///
    /// Panics if `target` is not registered.
    pub fn set_selected_target(&self, target: Option<TargetId>) {
        self.begin_change("select a target");
        {
            let mut data = self.data.borrow_mut();
            if let Some(id) = target {
                assert!(data.targets.contains_key(&id), "unknown target {id}");
            }
            if data.selected_target == target {
                return;
            }
            data.selected_target = target;
        }
        self.emit(SessionEvent::SelectedTargetChanged { target });
    }

    // ==================== Sampler ====================

    pub(crate) fn insert_sampler(
        &self,
        sampler: Arc<dyn Sampler>,
        creator: ParticipantKey,
    ) -> SessionResult<Registration<SamplerId>> {
        self.begin_change("add a sampler");
        if let Some((_, entry)) = &self.data.borrow().sampler {
            assert!(
                !ptr::addr_eq(Arc::as_ptr(&entry.object), Arc::as_ptr(&sampler)),
                "sampler '{}' is already registered",
                sampler.name()
            );
            return Err(SessionError::SamplerAlreadyRegistered);
        }

        let id: SamplerId = self.handles.allocate();
        self.announce(SessionEvent::AddingSampler { sampler: id });
        let registration = Registration::new(id);
        self.data.borrow_mut().sampler = Some((
            id,
            Entry {
                object: sampler,
                creator,
                registration: registration.clone(),
            },
        ));
        tracing::info!(target: "session", sampler = %id, "sampler added");
        self.emit(SessionEvent::SamplerAdded { sampler: id });
        self.touch();
        self.check_sampler_rate();
        if !registration.is_unregistered() {
            self.run_jobs();
        }
        Ok(registration)
    }

    pub fn sampler(&self) -> Option<Arc<dyn Sampler>> {
        self.data
            .borrow()
            .sampler
            .as_ref()
            .map(|(_, e)| Arc::clone(&e.object))
    }

    pub fn sampler_id(&self) -> Option<SamplerId> {
        self.data.borrow().sampler.as_ref().map(|(id, _)| *id)
    }

    /// Participant that created the sampler.
    pub fn sampler_creator(&self) -> Option<ParticipantKey> {
        self.data
            .borrow()
            .sampler
            .as_ref()
            .map(|(_, e)| e.creator)
    }

    /// Remove the sampler. A running sampler job goes back to waiting at the
    /// head of its queue.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not the registered sampler.
    pub fn remove_sampler(&self, id: SamplerId) {
        self.begin_change("remove the sampler");
        assert_eq!(self.sampler_id(), Some(id), "unknown sampler {id}");
        self.requeue_sampler_job();
        self.remove_scoped_menu_items(MenuLocation::Sampler(id));
        self.clear_focus_of(ComponentId::Sampler(id));

        self.announce(SessionEvent::RemovingSampler { sampler: id });
        let entry = self.data.borrow_mut().sampler.take();
        if let Some((_, entry)) = entry {
            entry.registration.fire(&entry.object);
        }
        tracing::info!(target: "session", sampler = %id, "sampler removed");
        self.emit(SessionEvent::SamplerRemoved { sampler: id });
        self.touch();
    }

    /// Remove a sampler whose fixed rate differs from the session's.
    pub(super) fn check_sampler_rate(&self) {
        let mismatch = {
            let data = self.data.borrow();
            match (&data.sampler, data.sample_rate) {
                (Some((id, entry)), Some(rate)) => entry
                    .object
                    .sample_rate()
                    .filter(|r| *r != rate)
                    .map(|r| (*id, r, rate)),
                _ => None,
            }
        };
        if let Some((id, sampler_rate, session_rate)) = mismatch {
            self.report_error(format!(
                "the sampler runs at {sampler_rate}, but the session sample rate is {session_rate}"
            ));
            self.remove_sampler(id);
        }
    }

    fn clear_focus_of(&self, component: ComponentId) {
        if self.focused_component() == Some(component) {
            self.set_focused_component(None);
        }
    }

    // ==================== Menu items ====================

    pub(crate) fn insert_menu_action(
        &self,
        action: Rc<MenuAction>,
        location: MenuLocation,
        sub_menus: &[&str],
        creator: ParticipantKey,
    ) -> Registration<MenuActionId> {
        self.begin_change("add a menu action");
        {
            let data = self.data.borrow();
            assert!(
                !data
                    .menu_actions
                    .values()
                    .any(|e| Rc::ptr_eq(&e.entry.object, &action)),
                "menu action '{}' is already registered",
                action.text()
            );
            assert!(
                data.has_location(location),
                "cannot add a menu action to unregistered {location:?}"
            );
        }
        let sub_menus: Vec<String> = sub_menus.iter().map(|s| s.to_string()).collect();
        let id: MenuActionId = self.handles.allocate();
        self.announce(SessionEvent::AddingMenuAction {
            action: id,
            location,
            sub_menus: sub_menus.clone(),
        });
        let registration = Registration::new(id);
        self.data.borrow_mut().menu_actions.insert(
            id,
            MenuEntry {
                entry: Entry {
                    object: action,
                    creator,
                    registration: registration.clone(),
                },
                location,
                sub_menus: sub_menus.clone(),
            },
        );
        self.emit(SessionEvent::MenuActionAdded {
            action: id,
            location,
            sub_menus,
        });
        registration
    }

    pub fn menu_action(&self, id: MenuActionId) -> Option<Rc<MenuAction>> {
        self.data
            .borrow()
            .menu_actions
            .get(&id)
            .map(|e| Rc::clone(&e.entry.object))
    }

    pub fn menu_action_location(&self, id: MenuActionId) -> Option<MenuLocation> {
        self.data.borrow().menu_actions.get(&id).map(|e| e.location)
    }

    /// Actions at `location`, in registration order.
    pub fn menu_actions(&self, location: MenuLocation) -> Vec<MenuActionId> {
        self.data
            .borrow()
            .menu_actions
            .iter()
            .filter(|(_, e)| e.location == location)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn menu_action_count(&self) -> usize {
        self.data.borrow().menu_actions.len()
    }

    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn remove_menu_action(&self, id: MenuActionId) {
        self.begin_change("remove a menu action");
        let (location, sub_menus) = match self.data.borrow().menu_actions.get(&id) {
            Some(e) => (e.location, e.sub_menus.clone()),
            None => panic!("unknown menu action {id}"),
        };
        self.announce(SessionEvent::RemovingMenuAction {
            action: id,
            location,
            sub_menus: sub_menus.clone(),
        });
        let entry = self.data.borrow_mut().menu_actions.shift_remove(&id);
        if let Some(e) = entry {
            e.entry.registration.fire(&e.entry.object);
        }
        self.emit(SessionEvent::MenuActionRemoved {
            action: id,
            location,
            sub_menus,
        });
    }

    pub(crate) fn insert_menu_separator(
        &self,
        separator: Rc<MenuSeparator>,
        location: MenuLocation,
        sub_menus: &[&str],
        creator: ParticipantKey,
    ) -> Registration<MenuSeparatorId> {
        self.begin_change("add a menu separator");
        {
            let data = self.data.borrow();
            assert!(
                !data
                    .menu_separators
                    .values()
                    .any(|e| Rc::ptr_eq(&e.entry.object, &separator)),
                "menu separator is already registered"
            );
            assert!(
                data.has_location(location),
                "cannot add a menu separator to unregistered {location:?}"
            );
        }
        let sub_menus: Vec<String> = sub_menus.iter().map(|s| s.to_string()).collect();
        let id: MenuSeparatorId = self.handles.allocate();
        self.announce(SessionEvent::AddingMenuSeparator {
            separator: id,
            location,
            sub_menus: sub_menus.clone(),
        });
        let registration = Registration::new(id);
        self.data.borrow_mut().menu_separators.insert(
            id,
            MenuEntry {
                entry: Entry {
                    object: separator,
                    creator,
                    registration: registration.clone(),
                },
                location,
                sub_menus: sub_menus.clone(),
            },
        );
        self.emit(SessionEvent::MenuSeparatorAdded {
            separator: id,
            location,
            sub_menus,
        });
        registration
    }

    pub fn menu_separator(&self, id: MenuSeparatorId) -> Option<Rc<MenuSeparator>> {
        self.data
            .borrow()
            .menu_separators
            .get(&id)
            .map(|e| Rc::clone(&e.entry.object))
    }

    pub fn menu_separator_count(&self) -> usize {
        self.data.borrow().menu_separators.len()
    }

    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn remove_menu_separator(&self, id: MenuSeparatorId) {
        self.begin_change("remove a menu separator");
        let (location, sub_menus) = match self.data.borrow().menu_separators.get(&id) {
            Some(e) => (e.location, e.sub_menus.clone()),
            None => panic!("unknown menu separator {id}"),
        };
        self.announce(SessionEvent::RemovingMenuSeparator {
            separator: id,
            location,
            sub_menus: sub_menus.clone(),
        });
        let entry = self.data.borrow_mut().menu_separators.shift_remove(&id);
        if let Some(e) = entry {
            e.entry.registration.fire(&e.entry.object);
        }
        self.emit(SessionEvent::MenuSeparatorRemoved {
            separator: id,
            location,
            sub_menus,
        });
    }

    /// Remove the menu items scoped to a component, newest first.
    fn remove_scoped_menu_items(&self, location: MenuLocation) {
        let (actions, separators) = {
            let data = self.data.borrow();
            let actions: Vec<MenuActionId> = data
                .menu_actions
                .iter()
                .filter(|(_, e)| e.location == location)
                .map(|(k, _)| *k)
                .collect();
            let separators: Vec<MenuSeparatorId> = data
                .menu_separators
                .iter()
                .filter(|(_, e)| e.location == location)
                .map(|(k, _)| *k)
                .collect();
            (actions, separators)
        };
        for id in actions.into_iter().rev() {
            self.remove_menu_action(id);
        }
        for id in separators.into_iter().rev() {
            self.remove_menu_separator(id);
        }
    }

    /// Mark every fresh wet sample stale after the effect chain changed.
    fn mark_wet_samples_stale(&self) {
        let changed: Vec<_> = {
            let mut data = self.data.borrow_mut();
            data.zones
                .iter_mut()
                .filter(|(_, e)| e.zone.wet_sample.is_some() && !e.zone.wet_sample_stale)
                .map(|(id, e)| {
                    e.zone.wet_sample_stale = true;
                    *id
                })
                .collect()
        };
        for zone in changed {
            self.emit(SessionEvent::ZoneChanged {
                zone,
                field: ZoneField::WetSample,
            });
        }
    }
}

fn participant_entry(
    participants: &mut indexmap::IndexMap<ParticipantKey, ParticipantEntry>,
    key: ParticipantKey,
) -> &mut ParticipantEntry {
    match participants.get_mut(&key) {
        Some(entry) => entry,
        None => panic!("unknown participant {key}"),
    }
}
