use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use synthclone_core::{Sample, SampleRate, Zone};
use synthclone_session::{
    Component, ComponentCore, ComponentError, Context, Effect, EventKind, JobReporter, Menu,
    MenuAction, MenuLocation, MenuSeparator, Participant, ParticipantInfo, ParticipantKey,
    Sampler, SamplerJobRequest, Session, SessionError, SessionEvent, Target,
};

struct Plain;

impl Participant for Plain {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo::new("Plain")
    }

    fn activate(&self, _context: &Context, _state: &Value) {}
}

/// Runs a closure with its context on activation.
struct Scripted<F: Fn(&Context)>(F);

impl<F: Fn(&Context)> Participant for Scripted<F> {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo::new("Scripted")
    }

    fn activate(&self, context: &Context, _state: &Value) {
        (self.0)(context);
    }
}

struct NullEffect(ComponentCore);

impl NullEffect {
    fn new() -> Arc<Self> {
        Arc::new(Self(ComponentCore::new("Null")))
    }
}

impl Component for NullEffect {
    fn core(&self) -> &ComponentCore {
        &self.0
    }
}

impl Effect for NullEffect {
    fn process(&self, _zone: &Zone, sample: &Sample) -> Result<Sample, ComponentError> {
        Ok(sample.clone())
    }
}

struct StubTarget {
    core: ComponentCore,
    fail: bool,
    saved: AtomicUsize,
}

impl StubTarget {
    fn new(name: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            core: ComponentCore::new(name),
            fail,
            saved: AtomicUsize::new(0),
        })
    }
}

impl Component for StubTarget {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

impl Target for StubTarget {
    fn validate(&self, zones: &[Zone]) -> Result<(), ComponentError> {
        if self.fail {
            return Err(ComponentError::new(self.name(), "no zones to write"));
        }
        assert!(!zones.is_empty());
        Ok(())
    }

    fn save(&self, _zones: &[Zone]) -> Result<(), ComponentError> {
        self.saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct IdleSampler {
    core: ComponentCore,
    rate: Option<SampleRate>,
}

impl IdleSampler {
    fn new(rate: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            core: ComponentCore::new("Idle"),
            rate: rate.map(|hz| SampleRate::new(hz).unwrap()),
        })
    }
}

impl Component for IdleSampler {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

impl Sampler for IdleSampler {
    fn sample_rate(&self) -> Option<SampleRate> {
        self.rate
    }

    fn start_job(&self, _request: SamplerJobRequest, _reporter: JobReporter) {}

    fn abort_job(&self) {}
}

fn activated(session: &Session, participant: Rc<dyn Participant>, id: &str) -> (ParticipantKey, Context) {
    let key = session.add_participant(participant, None, id).id();
    session.activate_participant(key);
    let context = session.context(key).unwrap();
    (key, context)
}

fn record(session: &Session, kinds: &[EventKind]) -> Rc<RefCell<Vec<&'static str>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for &kind in kinds {
        let log = Rc::clone(&log);
        session.subscribe(kind, move |event| log.borrow_mut().push(event.kind().name()));
    }
    log
}

#[test]
fn test_add_target_scenario() {
    let session = Session::new();
    let (key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");

    let t = ctx.add_target(StubTarget::new("T", false), Some(0));
    let t2 = ctx.add_target(StubTarget::new("T2", false), Some(0));

    assert_eq!(ctx.target_count(), 2);
    assert_eq!(ctx.target_at(0), Some(t2.id()));
    assert_eq!(ctx.target_index(t.id()), Some(1));

    session.remove_participant(key);
    assert_eq!(session.target_count(), 0);
    assert!(t.is_unregistered());
    assert!(t2.is_unregistered());
    assert!(ctx.is_closed());
}

#[test]
fn test_registration_fires_once_after_removal() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let reg = ctx.add_effect(NullEffect::new(), None);
    let fired = Rc::new(Cell::new(0));

    let (weak, f) = (Rc::downgrade(&session), Rc::clone(&fired));
    let id = reg.id();
    reg.on_unregistered(move |subject, effect| {
        let session = weak.upgrade().unwrap();
        assert_eq!(subject, id);
        assert!(session.effect(subject).is_none());
        assert_eq!(session.effect_count(), 0);
        assert_eq!(effect.name(), "Null");
        f.set(f.get() + 1);
    });

    session.remove_effect(id);
    assert_eq!(fired.get(), 1);
    assert!(reg.is_unregistered());
}

#[test]
fn test_teardown_order() {
    let session = Session::new();
    let log = record(
        &session,
        &[
            EventKind::ParticipantRemoved,
            EventKind::EffectRemoved,
            EventKind::MenuActionRemoved,
        ],
    );
    let participant = Scripted(|ctx: &Context| {
        ctx.add_participant(Rc::new(Plain), "child");
        let effect = ctx.add_effect(NullEffect::new(), None);
        ctx.add_menu_action(
            MenuAction::new("Remove"),
            MenuLocation::Effect(effect.id()),
            &[],
        );
    });
    let (key, _ctx) = activated(&session, Rc::new(participant), "com.example.p");
    assert_eq!(session.participant_count(Some(key)), 1);
    assert_eq!(session.menu_action_count(), 1);

    log.borrow_mut().clear();
    session.deactivate_participant(key);

    assert_eq!(
        *log.borrow(),
        ["ParticipantRemoved", "MenuActionRemoved", "EffectRemoved"]
    );
    assert_eq!(session.participant_count(Some(key)), 0);
    assert_eq!(session.effect_count(), 0);
    assert_eq!(session.menu_action_count(), 0);
    assert!(session.has_participant(key));
}

#[test]
fn test_teardown_skips_objects_already_removed() {
    let session = Session::new();
    let (key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");

    let effects: Vec<_> = (0..3)
        .map(|_| ctx.add_effect(NullEffect::new(), None))
        .collect();
    let separator = ctx.add_menu_separator(MenuSeparator::new(), Menu::Tools, &["Sub"]);
    let sampler = ctx.add_sampler(IdleSampler::new(None)).unwrap();

    session.remove_effect(effects[1].id());
    session.remove_menu_separator(separator.id());
    let (_other, other_ctx) = activated(&session, Rc::new(Plain), "com.example.q");
    other_ctx.add_effect(NullEffect::new(), None);

    session.deactivate_participant(key);
    assert_eq!(session.effect_count(), 1);
    assert!(effects.iter().all(|e| e.is_unregistered()));
    assert!(sampler.is_unregistered());
    assert_eq!(session.sampler_id(), None);
    assert_eq!(session.menu_separator_count(), 0);
}

#[test]
fn test_effects_removed_highest_index_first() {
    let session = Session::new();
    let removed = Rc::new(RefCell::new(Vec::new()));
    let r = Rc::clone(&removed);
    session.subscribe(EventKind::RemovingEffect, move |event| {
        if let SessionEvent::RemovingEffect { index, .. } = event {
            r.borrow_mut().push(*index);
        }
    });

    let (key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    ctx.add_effect(NullEffect::new(), None);
    ctx.add_effect(NullEffect::new(), Some(0));
    ctx.add_effect(NullEffect::new(), Some(1));
    session.deactivate_participant(key);

    assert_eq!(*removed.borrow(), [2, 1, 0]);
}

#[test]
fn test_relay_attaches_once_per_kind() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let kind = EventKind::ZoneAdded;
    let baseline = session.bus().listener_count(kind);
    assert!(!ctx.is_relaying(kind));

    let hits = Rc::new(Cell::new(0));
    let (h1, h2) = (Rc::clone(&hits), Rc::clone(&hits));
    let a = ctx.subscribe(kind, move |_| h1.set(h1.get() + 1));
    assert!(ctx.is_relaying(kind));
    assert_eq!(session.bus().listener_count(kind), baseline + 1);

    let b = ctx.subscribe(kind, move |_| h2.set(h2.get() + 1));
    assert_eq!(session.bus().listener_count(kind), baseline + 1);

    session.add_zone(None);
    assert_eq!(hits.get(), 2);

    assert!(ctx.unsubscribe(a));
    assert!(ctx.is_relaying(kind));
    assert!(ctx.unsubscribe(b));
    assert!(!ctx.is_relaying(kind));
    assert_eq!(session.bus().listener_count(kind), baseline);

    session.add_zone(None);
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_state_changes_are_relayed_under_session_name() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");

    let states = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&states);
    ctx.subscribe(EventKind::SessionStateChanged, move |event| {
        if let SessionEvent::SessionStateChanged { state, .. } = event {
            s.borrow_mut().push(*state);
        }
    });
    session
        .create_session(&synthclone_core::SessionConfig::new(dir.path()))
        .unwrap();

    assert_eq!(
        *states.borrow(),
        [
            synthclone_core::SessionState::Loading,
            synthclone_core::SessionState::LoadedClean
        ]
    );
}

#[test]
fn test_deactivation_detaches_relays() {
    let session = Session::new();
    let (key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let baseline = session.bus().listener_count(EventKind::EffectAdded);
    ctx.subscribe(EventKind::EffectAdded, |_| {});
    assert_eq!(session.bus().listener_count(EventKind::EffectAdded), baseline + 1);

    session.deactivate_participant(key);
    assert_eq!(session.bus().listener_count(EventKind::EffectAdded), baseline);
}

#[test]
fn test_subscriptions_stay_with_their_bus() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let (_other, other_ctx) = activated(&session, Rc::new(Plain), "com.example.q");
    let session_sub = session.subscribe(EventKind::EffectAdded, |_| {});
    let ctx_sub = ctx.subscribe(EventKind::EffectAdded, |_| {});
    let other_sub = other_ctx.subscribe(EventKind::EffectAdded, |_| {});
    let session_listeners = session.bus().listener_count(EventKind::EffectAdded);

    assert!(!ctx.unsubscribe(session_sub));
    assert!(!ctx.unsubscribe(other_sub));
    assert!(!session.unsubscribe(ctx_sub));
    assert!(ctx.is_relaying(EventKind::EffectAdded));
    assert!(other_ctx.is_relaying(EventKind::EffectAdded));
    assert_eq!(
        session.bus().listener_count(EventKind::EffectAdded),
        session_listeners
    );

    assert!(ctx.unsubscribe(ctx_sub));
    assert!(!ctx.is_relaying(EventKind::EffectAdded));
    assert!(session.unsubscribe(session_sub));
}

#[test]
#[should_panic(expected = "do not publish")]
fn test_subscribing_to_generic_state_change_panics() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    ctx.subscribe(EventKind::StateChanged, |_| {});
}

#[test]
fn test_second_sampler_is_rejected() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let first = ctx.add_sampler(IdleSampler::new(None)).unwrap();
    let err = ctx.add_sampler(IdleSampler::new(None)).unwrap_err();

    assert!(matches!(err, SessionError::SamplerAlreadyRegistered));
    assert_eq!(session.sampler_id(), Some(first.id()));
}

#[test]
#[should_panic(expected = "already registered")]
fn test_same_sampler_twice_panics() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let sampler = IdleSampler::new(None);
    ctx.add_sampler(sampler.clone()).unwrap();
    let _ = ctx.add_sampler(sampler);
}

#[test]
fn test_sampler_with_mismatched_rate_is_removed() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let errors = record(&session, &[EventKind::ErrorReported]);
    session.set_sample_rate(Some(48000)).unwrap();

    let reg = ctx.add_sampler(IdleSampler::new(Some(44100))).unwrap();
    assert!(reg.is_unregistered());
    assert_eq!(session.sampler_id(), None);
    assert_eq!(errors.borrow().len(), 1);

    let reg = ctx.add_sampler(IdleSampler::new(Some(48000))).unwrap();
    assert!(!reg.is_unregistered());
}

#[test]
#[should_panic(expected = "already registered")]
fn test_same_effect_twice_panics() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let effect = NullEffect::new();
    ctx.add_effect(effect.clone(), None);
    ctx.add_effect(effect, None);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_add_effect_past_end_panics() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    ctx.add_effect(NullEffect::new(), Some(1));
}

#[test]
#[should_panic(expected = "is not a valid participant id")]
fn test_malformed_participant_id_panics() {
    let session = Session::new();
    session.add_participant(Rc::new(Plain), None, "a..b");
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_participant_id_panics() {
    let session = Session::new();
    session.add_participant(Rc::new(Plain), None, "com.example.p");
    session.add_participant(Rc::new(Plain), None, "com.example.p");
}

#[test]
#[should_panic(expected = "unregistered")]
fn test_menu_action_for_unknown_component_panics() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let reg = ctx.add_target(StubTarget::new("T", false), None);
    session.remove_target(reg.id());
    ctx.add_menu_action(MenuAction::new("Gone"), MenuLocation::Target(reg.id()), &[]);
}

#[test]
#[should_panic(expected = "used after deactivation")]
fn test_context_after_deactivation_panics() {
    let session = Session::new();
    let (key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    session.deactivate_participant(key);
    ctx.effect_count();
}

#[test]
#[should_panic(expected = "pending change is being announced")]
fn test_mutation_during_announcement_panics() {
    let session = Session::new();
    let weak = Rc::downgrade(&session);
    session.subscribe(EventKind::AddingZone, move |_| {
        weak.upgrade().unwrap().add_zone(None);
    });
    session.add_zone(None);
}

#[test]
fn test_did_events_allow_reentrant_changes() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let weak = Rc::downgrade(&session);
    session.subscribe(EventKind::EffectAdded, move |event| {
        let session = weak.upgrade().unwrap();
        if let SessionEvent::EffectAdded { effect, .. } = event {
            session.set_selected_effect(Some(*effect));
        }
    });
    let reg = ctx.add_effect(NullEffect::new(), None);
    assert_eq!(session.selected_effect(), Some(reg.id()));
}

#[test]
fn test_child_participants() {
    let session = Session::new();
    let root = session
        .add_participant(Rc::new(Plain), None, "com.example.root")
        .id();
    let child = session
        .add_participant(Rc::new(Plain), Some(root), "child-1")
        .id();

    assert_eq!(
        session.participant_id(child).unwrap().as_str(),
        "com.example.root.child-1"
    );
    assert_eq!(session.participant_parent(child), Some(root));
    assert_eq!(session.participant_count(Some(root)), 1);
    assert_eq!(session.participant_at(0, Some(root)), Some(child));
    assert_eq!(session.find_participant("com.example.root.child-1"), Some(child));

    session.remove_participant(root);
    assert!(!session.has_participant(child));
    assert_eq!(session.participant_count(None), 0);
}

#[test]
fn test_removing_component_clears_selection_and_menus() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let effect = ctx.add_effect(NullEffect::new(), None);
    let action = ctx.add_menu_action(
        MenuAction::new("Edit"),
        MenuLocation::Effect(effect.id()),
        &["Settings"],
    );
    session.set_selected_effect(Some(effect.id()));
    session.set_focused_component(Some(effect.id().into()));

    session.remove_effect_at(0);
    assert!(action.is_unregistered());
    assert_eq!(session.selected_effect(), None);
    assert_eq!(session.focused_component(), None);
}

#[test]
fn test_build_targets_reports_failures() {
    let session = Session::new();
    let (_key, ctx) = activated(&session, Rc::new(Plain), "com.example.p");
    let log = record(
        &session,
        &[
            EventKind::BuildingTargets,
            EventKind::TargetSaved,
            EventKind::TargetSaveError,
            EventKind::ErrorReported,
            EventKind::TargetBuildingCompleted,
        ],
    );
    session.add_zone(None);
    let good = StubTarget::new("Good", false);
    ctx.add_target(good.clone(), None);
    let bad = ctx.add_target(StubTarget::new("Bad", true), None);

    let results = session.build_targets();
    assert_eq!(results.len(), 2);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, bad.id());
    assert!(results[1].1.is_err());
    assert_eq!(good.saved.load(Ordering::Relaxed), 1);
    assert_eq!(
        *log.borrow(),
        [
            "BuildingTargets",
            "TargetSaved",
            "TargetSaveError",
            "ErrorReported",
            "TargetBuildingCompleted"
        ]
    );
}

#[test]
fn test_menu_action_trigger() {
    let action = MenuAction::new("Generate");
    let hits = Rc::new(Cell::new(0));
    let h = Rc::clone(&hits);
    action.on_triggered(move || h.set(h.get() + 1));

    action.trigger();
    action.set_enabled(false);
    action.trigger();
    assert_eq!(hits.get(), 1);
}
