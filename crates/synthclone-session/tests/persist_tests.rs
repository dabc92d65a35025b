use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Value, json};
use synthclone_core::{
    ParticipantId, ParticipantRecord, SAMPLE_DIRECTORY_NAME, SAMPLE_STAGING_DIRECTORY_NAME, Sample,
    SampleRate, SessionConfig, SessionDocument, SessionState, Zone, ZoneField, ZoneValue,
};
use synthclone_session::{
    Component, ComponentCore, ComponentError, Context, Effect, EffectId, EventKind, Participant,
    ParticipantInfo, Session, SessionError,
};

struct Level {
    core: ComponentCore,
    amount: f64,
}

impl Component for Level {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

impl Effect for Level {
    fn process(&self, _zone: &Zone, sample: &Sample) -> Result<Sample, ComponentError> {
        let mut wet = sample.clone();
        wet.data.iter_mut().for_each(|v| *v *= self.amount as f32);
        Ok(wet)
    }
}

/// Keeps its state blob and recreates effects from saved state.
#[derive(Default)]
struct Keeper {
    state: RefCell<Value>,
    effects: RefCell<Vec<(EffectId, f64)>>,
    activations: RefCell<usize>,
}

impl Keeper {
    fn add_level(&self, context: &Context, amount: f64) {
        let reg = context.add_effect(
            Arc::new(Level {
                core: ComponentCore::new("Level"),
                amount,
            }),
            None,
        );
        self.effects.borrow_mut().push((reg.id(), amount));
    }
}

impl Participant for Keeper {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo::new("Keeper")
    }

    fn activate(&self, _context: &Context, state: &Value) {
        *self.state.borrow_mut() = state.clone();
        *self.activations.borrow_mut() += 1;
    }

    fn deactivate(&self, _context: &Context) {
        self.effects.borrow_mut().clear();
    }

    fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    fn effect_state(&self, effect: EffectId) -> Value {
        let effects = self.effects.borrow();
        let amount = effects.iter().find(|(id, _)| *id == effect).map(|(_, a)| *a);
        json!({ "amount": amount })
    }

    fn restore_effect(&self, context: &Context, state: &Value) {
        let amount = state["amount"].as_f64().unwrap_or(1.0);
        self.add_level(context, amount);
    }
}

fn new_session(dir: &std::path::Path) -> (Rc<Session>, Rc<Keeper>) {
    let session = Session::new();
    let keeper = Rc::new(Keeper::default());
    session.add_participant(keeper.clone(), None, "com.example.keeper");
    session.create_session(&SessionConfig::new(dir)).unwrap();
    (session, keeper)
}

#[test]
fn test_create_and_reload_empty_session() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());

    assert!(Session::is_session_directory(dir.path()));
    assert_eq!(session.state(), SessionState::LoadedClean);
    assert_eq!(session.directory().as_deref(), Some(dir.path()));
    assert_eq!(session.sample_rate().map(SampleRate::hz), Some(44100));

    session.unload_session().unwrap();
    assert_eq!(session.state(), SessionState::NotLoaded);
    assert_eq!(session.directory(), None);
    assert_eq!(session.sample_rate(), None);

    session.load_session(dir.path()).unwrap();
    assert_eq!(session.state(), SessionState::LoadedClean);
}

#[test]
fn test_create_refuses_existing_session() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());
    assert!(matches!(
        session.create_session(&SessionConfig::new(dir.path())),
        Err(SessionError::SessionAlreadyLoaded)
    ));

    let other = Session::new();
    assert!(matches!(
        other.create_session(&SessionConfig::new(dir.path())),
        Err(SessionError::SessionExists { .. })
    ));
}

#[test]
fn test_load_rejects_plain_directory() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new();
    assert!(matches!(
        session.load_session(dir.path()),
        Err(SessionError::NotASession { .. })
    ));
    assert_eq!(session.state(), SessionState::NotLoaded);
}

#[test]
fn test_participant_state_round_trips_with_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let (session, keeper) = new_session(dir.path());
    let key = session.find_participant("com.example.keeper").unwrap();
    session.activate_participant(key);
    *keeper.state.borrow_mut() = json!({"x": 1, "y": "s", "z": true});

    session.save_session().unwrap();
    session.unload_session().unwrap();
    assert!(!session.is_participant_active(key));
    *keeper.state.borrow_mut() = Value::Null;

    session.load_session(dir.path()).unwrap();
    assert!(session.is_participant_active(key));
    assert_eq!(*keeper.state.borrow(), json!({"x": 1, "y": "s", "z": true}));
    assert_eq!(*keeper.activations.borrow(), 2);
}

#[test]
fn test_components_are_restored_by_their_creator() {
    let dir = tempfile::tempdir().unwrap();
    let (session, keeper) = new_session(dir.path());
    let key = session.find_participant("com.example.keeper").unwrap();
    let other = Rc::new(Keeper::default());
    let other_key = session
        .add_participant(other.clone(), None, "com.example.other")
        .id();
    session.activate_participant(key);
    session.activate_participant(other_key);
    keeper.add_level(&session.context(key).unwrap(), 0.5);
    keeper.add_level(&session.context(key).unwrap(), 2.0);
    other.add_level(&session.context(other_key).unwrap(), 1.0);
    assert_eq!(session.state(), SessionState::LoadedDirty);

    session.save_session().unwrap();
    session.unload_session().unwrap();
    assert_eq!(session.effect_count(), 0);

    session.load_session(dir.path()).unwrap();
    assert_eq!(session.effect_count(), 3);
    let amounts: Vec<f64> = keeper.effects.borrow().iter().map(|(_, a)| *a).collect();
    assert_eq!(amounts, [0.5, 2.0]);
    assert_eq!(other.effects.borrow().len(), 1);
    assert_eq!(session.effect_creator(session.effect_at(0).unwrap()), Some(key));
    assert_eq!(
        session.effect_creator(session.effect_at(2).unwrap()),
        Some(other_key)
    );
}

#[test]
fn test_zones_and_samples_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());
    let rate = SampleRate::new(44100).unwrap();
    let sample = Sample::new(rate, 2, vec![0.1, -0.1, 0.2, -0.2]).unwrap();

    let a = session.add_zone(None).id();
    session.set_zone_property(a, ZoneValue::Note(0x30)).unwrap();
    session
        .set_zone_property(a, ZoneValue::Control(7, Some(100)))
        .unwrap();
    session
        .set_zone_property(a, ZoneValue::DrySample(Some(Arc::new(sample.clone()))))
        .unwrap();
    session.set_zone_selected(a, true);
    session.add_zone(None);
    session.set_property_visible(ZoneField::Channel, true);

    session.save_session().unwrap();
    session.unload_session().unwrap();
    assert_eq!(session.zone_count(), 0);
    assert!(!session.is_property_visible(ZoneField::Channel));

    session.load_session(dir.path()).unwrap();
    assert_eq!(session.zone_count(), 2);
    let loaded = session.zone(session.zone_at(0).unwrap()).unwrap();
    assert_eq!(loaded.note, 0x30);
    assert_eq!(loaded.control(7), Some(100));
    assert_eq!(loaded.dry_sample.as_deref(), Some(&sample));
    assert!(loaded.wet_sample.is_none());
    assert!(session.is_zone_selected(session.zone_at(0).unwrap()));
    assert!(!session.is_zone_selected(session.zone_at(1).unwrap()));
    assert!(session.is_property_visible(ZoneField::Channel));
    assert_eq!(session.state(), SessionState::LoadedClean);
}

#[test]
fn test_failed_save_keeps_previous_samples() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());
    let rate = SampleRate::new(44100).unwrap();
    let saved = Sample::new(rate, 1, vec![0.5; 4]).unwrap();
    let zone = session.add_zone(None).id();
    session
        .set_zone_property(zone, ZoneValue::DrySample(Some(Arc::new(saved.clone()))))
        .unwrap();
    session.save_session().unwrap();

    let dry_file = dir.path().join(SAMPLE_DIRECTORY_NAME).join("zone-0-dry.f32");
    let staging = dir.path().join(SAMPLE_STAGING_DIRECTORY_NAME);
    assert!(dry_file.is_file());
    assert!(!staging.exists());

    let replacement = Sample::new(rate, 1, vec![-0.5; 4]).unwrap();
    session
        .set_zone_property(zone, ZoneValue::DrySample(Some(Arc::new(replacement))))
        .unwrap();
    std::fs::write(&staging, b"in the way").unwrap();
    assert!(session.save_session().is_err());
    assert_eq!(session.state(), SessionState::LoadedDirty);
    assert!(dry_file.is_file());

    std::fs::remove_file(&staging).unwrap();
    session.unload_session().unwrap();
    session.load_session(dir.path()).unwrap();
    let loaded = session.zone(session.zone_at(0).unwrap()).unwrap();
    assert_eq!(loaded.dry_sample.as_deref(), Some(&saved));
}

#[test]
fn test_resave_replaces_sample_files() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());
    let rate = SampleRate::new(44100).unwrap();
    let zones: Vec<_> = (0..2).map(|_| session.add_zone(None).id()).collect();
    for zone in &zones {
        let sample = Sample::new(rate, 1, vec![0.25; 4]).unwrap();
        session
            .set_zone_property(*zone, ZoneValue::DrySample(Some(Arc::new(sample))))
            .unwrap();
    }
    session.save_session().unwrap();

    session.remove_zone(zones[0]);
    session.save_session().unwrap();

    let mut files: Vec<String> = std::fs::read_dir(dir.path().join(SAMPLE_DIRECTORY_NAME))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, ["zone-0-dry.f32"]);
    let mut entries: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, ["samples", "synthclone.json"]);
}

#[test]
fn test_unknown_participants_survive_a_save() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = SessionDocument::new(SampleRate::new(48000).ok(), 1);
    doc.participants.push(ParticipantRecord {
        id: ParticipantId::parse("org.other.plugin").unwrap(),
        active: true,
        state: json!({"kept": [1, 2, 3]}),
    });
    doc.write(dir.path()).unwrap();

    let session = Session::new();
    session.load_session(dir.path()).unwrap();
    assert_eq!(session.sample_channel_count(), 1);
    session.save_session().unwrap();

    let saved = SessionDocument::read(dir.path()).unwrap();
    assert_eq!(saved.participants, doc.participants);
}

#[test]
fn test_save_as_moves_session() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(first.path());

    session.save_session_as(second.path()).unwrap();
    assert_eq!(session.directory().as_deref(), Some(second.path()));
    assert!(Session::is_session_directory(second.path()));

    assert!(matches!(
        session.save_session_as(first.path()),
        Err(SessionError::SessionExists { .. })
    ));
}

#[test]
fn test_save_without_session_fails() {
    let session = Session::new();
    assert!(matches!(
        session.save_session(),
        Err(SessionError::SessionNotLoaded)
    ));
    assert!(matches!(
        session.unload_session(),
        Err(SessionError::SessionNotLoaded)
    ));
}

#[test]
fn test_quit_unloads_and_flags() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _keeper) = new_session(dir.path());
    let states = Rc::new(RefCell::new(Vec::new()));
    let s = Rc::clone(&states);
    session.subscribe(EventKind::StateChanged, move |event| {
        s.borrow_mut().push(event.clone());
    });

    session.quit_session().unwrap();
    assert!(session.is_quit_requested());
    assert_eq!(session.state(), SessionState::NotLoaded);
    assert_eq!(states.borrow().len(), 2);
}
