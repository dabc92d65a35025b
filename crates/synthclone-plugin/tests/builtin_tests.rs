use std::sync::Arc;

use synthclone_core::{Sample, SampleRate, SessionConfig, ZoneValue};
use synthclone_plugin::builtin::{
    TRIMMER_ID, TrimmerPlugin, ZONE_GENERATOR_ID, ZoneGeneratorPlugin, ZoneGeneratorSettings,
};
use synthclone_plugin::{HostConfig, PluginManager, builtin_plugins};
use synthclone_session::{Menu, MenuLocation, Session};

fn manager() -> PluginManager {
    PluginManager::new(Session::new(), HostConfig::default())
}

fn trigger(session: &Session, location: MenuLocation, text: &str) {
    let action = session
        .menu_actions(location)
        .into_iter()
        .filter_map(|id| session.menu_action(id))
        .find(|a| a.text() == text)
        .unwrap_or_else(|| panic!("no '{text}' action"));
    action.trigger();
}

fn small_settings() -> ZoneGeneratorSettings {
    let mut settings = ZoneGeneratorSettings::default();
    settings.set_first_note(60).unwrap();
    settings.set_last_note(62).unwrap();
    settings.set_velocity_layers(2).unwrap();
    settings.set_channel(3).unwrap();
    settings
}

#[test]
fn test_builtin_plugins_register() {
    let mut manager = manager();
    assert_eq!(manager.register_all(builtin_plugins()), 2);
    let ids: Vec<String> = manager.plugins().iter().map(|p| p.id.to_string()).collect();
    assert_eq!(ids, [ZONE_GENERATOR_ID, TRIMMER_ID]);
    assert_eq!(
        manager.plugin(TRIMMER_ID).unwrap().metadata.name,
        "Trimmer"
    );
}

#[test]
fn test_generate_zones_from_menu() {
    let mut manager = manager();
    let plugin = ZoneGeneratorPlugin::new();
    let generator = plugin.generator();
    manager.register_plugin(Box::new(plugin)).unwrap();
    manager.activate_plugin(ZONE_GENERATOR_ID).unwrap();
    generator.set_settings(small_settings());

    let session = manager.session().clone();
    trigger(&session, Menu::Tools.into(), "Generate Zones");

    assert_eq!(session.zone_count(), 6);
    let zones: Vec<_> = (0..6)
        .map(|i| session.zone(session.zone_at(i).unwrap()).unwrap())
        .collect();
    let keys: Vec<(u8, u8)> = zones.iter().map(|z| (z.note, z.velocity)).collect();
    assert_eq!(keys, [(60, 63), (60, 127), (61, 63), (61, 127), (62, 63), (62, 127)]);
    assert!(zones.iter().all(|z| z.channel == 3 && z.aftertouch.is_none()));
}

#[test]
fn test_generate_requires_activation() {
    let mut manager = manager();
    let plugin = ZoneGeneratorPlugin::new();
    let generator = plugin.generator();
    manager.register_plugin(Box::new(plugin)).unwrap();
    assert!(generator.generate().is_err());

    manager.activate_plugin(ZONE_GENERATOR_ID).unwrap();
    generator.set_settings(small_settings());
    assert_eq!(generator.generate().unwrap(), 6);

    manager.deactivate_plugin(ZONE_GENERATOR_ID).unwrap();
    assert!(!generator.is_active());
    assert!(manager.session().menu_actions(Menu::Tools.into()).is_empty());
}

#[test]
fn test_generator_settings_persist() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager();
    let plugin = ZoneGeneratorPlugin::new();
    let generator = plugin.generator();
    manager.register_plugin(Box::new(plugin)).unwrap();
    let session = manager.session().clone();

    session.create_session(&SessionConfig::new(dir.path())).unwrap();
    manager.activate_plugin(ZONE_GENERATOR_ID).unwrap();
    generator.set_settings(small_settings());
    session.save_session().unwrap();
    session.unload_session().unwrap();

    generator.set_settings(ZoneGeneratorSettings::default());
    session.load_session(dir.path()).unwrap();
    assert!(generator.is_active());
    assert_eq!(generator.settings(), small_settings());
}

#[test]
fn test_trimmer_effect_and_remove_action() {
    let mut manager = manager();
    let plugin = TrimmerPlugin::new();
    let trimmer = plugin.trimmer();
    manager.register_plugin(Box::new(plugin)).unwrap();
    manager.activate_plugin(TRIMMER_ID).unwrap();
    let session = manager.session().clone();

    trigger(&session, Menu::AddEffect.into(), "Trimmer");
    assert_eq!(session.effect_count(), 1);
    let (id, _) = trimmer.effects()[0].clone();
    assert_eq!(session.effect_at(0), Some(id));

    trigger(&session, MenuLocation::Effect(id), "Remove");
    assert_eq!(session.effect_count(), 0);
    assert!(trimmer.effects().is_empty());
    assert!(session.menu_actions(MenuLocation::Effect(id)).is_empty());
}

#[test]
fn test_trimmer_threshold_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager();
    let plugin = TrimmerPlugin::new();
    let trimmer = plugin.trimmer();
    manager.register_plugin(Box::new(plugin)).unwrap();
    let session = manager.session().clone();

    session.create_session(&SessionConfig::new(dir.path())).unwrap();
    manager.activate_plugin(TRIMMER_ID).unwrap();
    trigger(&session, Menu::AddEffect.into(), "Trimmer");
    trimmer.effects()[0].1.set_threshold(-30.0).unwrap();
    session.save_session().unwrap();

    session.unload_session().unwrap();
    assert_eq!(session.effect_count(), 0);
    assert!(trimmer.effects().is_empty());

    session.load_session(dir.path()).unwrap();
    let effects = trimmer.effects();
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0].1.threshold(), -30.0);
    assert_eq!(session.effect_at(0), Some(effects[0].0));
}

#[test]
fn test_trimmer_runs_in_effect_chain() {
    let mut manager = manager();
    let plugin = TrimmerPlugin::new();
    let trimmer = plugin.trimmer();
    manager.register_plugin(Box::new(plugin)).unwrap();
    manager.activate_plugin(TRIMMER_ID).unwrap();
    let session = manager.session().clone();
    trigger(&session, Menu::AddEffect.into(), "Trimmer");
    trimmer.effects()[0].1.set_threshold(-40.0).unwrap();

    let zone = session.add_zone(None).id();
    let dry = Sample::new(
        SampleRate::new(48000).unwrap(),
        1,
        vec![0.0, 0.0, 0.25, -0.5, 0.25, 0.0],
    )
    .unwrap();
    session
        .set_zone_property(zone, ZoneValue::DrySample(Some(Arc::new(dry))))
        .unwrap();

    let key = manager.plugin(TRIMMER_ID).unwrap().key;
    session.context(key).unwrap().add_effect_job(zone, None);
    assert_eq!(session.wait_for_completion(), 1);
    let wet = session.zone(zone).unwrap().wet_sample.unwrap();
    assert_eq!(wet.data, vec![0.25, -0.5, 0.25]);
}

#[test]
fn test_unloading_plugin_removes_what_it_created() {
    let mut manager = manager();
    manager.register_all(builtin_plugins());
    manager.activate_plugin(TRIMMER_ID).unwrap();
    manager.activate_plugin(ZONE_GENERATOR_ID).unwrap();
    let session = manager.session().clone();
    trigger(&session, Menu::AddEffect.into(), "Trimmer");
    trigger(&session, Menu::AddEffect.into(), "Trimmer");
    assert_eq!(session.effect_count(), 2);

    manager.unload_plugin(TRIMMER_ID).unwrap();
    assert_eq!(session.effect_count(), 0);
    assert!(session.menu_actions(Menu::AddEffect.into()).is_empty());
    assert_eq!(session.menu_actions(Menu::Tools.into()).len(), 1);
    assert!(manager.plugin(TRIMMER_ID).is_none());
}
