use std::cmp::Ordering;
use std::sync::Arc;

use synthclone_core::{
    HandleAllocator, ParticipantId, PropertyVisibility, Sample, SampleRate, SessionConfig,
    SessionDocument, SessionError, SessionState, Zone, ZoneComparer, ZoneField, ZoneId,
    ZoneRecord, ZoneValue,
};

#[test]
fn test_participant_id_grammar() {
    let accepted = ["a.b-c", "a.b--c", "com.example.synthclone.plugins.test"];
    let rejected = ["a.", ".a.b", "a..b", "a.-b", "-"];

    for id in accepted {
        assert!(ParticipantId::parse(id).is_ok(), "{id} should parse");
    }
    for id in rejected {
        let err = ParticipantId::parse(id).unwrap_err();
        assert!(matches!(err, SessionError::InvalidParticipantId { .. }));
        assert!(err.is_validation());
    }
}

#[test]
fn test_handles_are_never_reused() {
    let alloc = HandleAllocator::new();
    let ids: Vec<ZoneId> = (0..5).map(|_| alloc.allocate()).collect();
    let mut sorted = ids.clone();
    sorted.dedup();
    assert_eq!(ids, sorted);
    assert_eq!(ids.len(), 5);
}

#[test]
fn test_session_state_display() {
    assert_eq!(SessionState::LoadedDirty.to_string(), "modified");
    assert!(SessionState::LoadedClean.is_loaded());
    assert!(!SessionState::Saving.is_loaded());
}

#[test]
fn test_zone_record_with_samples_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let rate = SampleRate::new(44100).unwrap();
    let sample = Sample::new(rate, 1, vec![0.5; 32]).unwrap();

    let mut zone = Zone::default();
    zone.apply(ZoneValue::Control(1, Some(64))).unwrap();
    zone.apply(ZoneValue::DrySample(Some(Arc::new(sample.clone()))))
        .unwrap();

    let mut doc = SessionDocument::new(Some(rate), 1);
    doc.write(dir.path()).unwrap();
    let dry = synthclone_core::SampleRecord::write(dir.path(), "0-dry.f32", &sample).unwrap();
    doc.zones.push(ZoneRecord {
        zone: zone.clone(),
        selected: true,
        dry_sample: Some(dry),
        wet_sample: None,
    });
    doc.write(dir.path()).unwrap();

    let loaded = SessionDocument::read(dir.path()).unwrap();
    let record = &loaded.zones[0];
    assert!(record.selected);
    assert_eq!(record.zone.control(1), Some(64));
    assert!(record.zone.dry_sample.is_none());
    let restored = record.dry_sample.as_ref().unwrap().read(dir.path()).unwrap();
    assert_eq!(restored, sample);
}

#[test]
fn test_config_rate_validation() {
    let config = SessionConfig::new("/tmp/session");
    assert_eq!(config.rate().unwrap().map(SampleRate::hz), Some(44100));
}

#[test]
fn test_visibility_and_sorting_by_field() {
    let vis = PropertyVisibility::default();
    assert!(vis.is_visible(ZoneField::Velocity));

    let mut zones = vec![
        Zone {
            velocity: 100,
            ..Zone::default()
        },
        Zone {
            velocity: 20,
            ..Zone::default()
        },
    ];
    zones.sort_by(|a, b| ZoneField::Velocity.compare(a, b));
    assert_eq!(zones[0].velocity, 20);
    assert_eq!(
        ZoneField::Velocity.compare(&zones[1], &zones[0]),
        Ordering::Greater
    );
}
