//! Creating, loading, saving and unloading session directories.

use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use synthclone_core::{
    ComponentRecord, ParticipantKey, ParticipantRecord, PropertyVisibility, SAMPLE_DIRECTORY_NAME,
    SAMPLE_STAGING_DIRECTORY_NAME, Sample, SampleRecord, SessionConfig, SessionDocument,
    SessionError, SessionResult, SessionState, Zone, ZoneRecord, validate_channel_count,
};

use super::Session;
use crate::participant::Participant;

/// Holds the previous sample directory while a save swaps in the new one.
const SAMPLE_BACKUP_DIRECTORY_NAME: &str = ".samples-previous";

/// Component records grouped by kind, as handed to creators on load.
#[derive(Clone, Copy)]
enum RecordKind {
    Effect,
    Sampler,
    Target,
}

impl Session {
    /// Check whether `dir` holds a session.
    pub fn is_session_directory(dir: &Path) -> bool {
        SessionDocument::exists(dir)
    }

    /// Write an empty session into `config.directory` and load it.
    pub fn create_session(&self, config: &SessionConfig) -> SessionResult<()> {
        self.begin_change("create a session");
        if self.state() != SessionState::NotLoaded {
            return Err(SessionError::SessionAlreadyLoaded);
        }
        let dir = config.directory.as_path();
        if SessionDocument::exists(dir) {
            return Err(SessionError::SessionExists {
                path: dir.to_path_buf(),
            });
        }
        let rate = config.rate()?;
        let channels = validate_channel_count(config.channel_count)?;
        fs::create_dir_all(dir).map_err(|e| SessionError::io(dir, e))?;
        SessionDocument::new(rate, channels).write(dir)?;
        tracing::info!(target: "session", directory = %dir.display(), "session created");
        self.load_session(dir)
    }

    /// Load the session in `dir`.
    ///
    /// Participants saved as active are activated with their saved state,
    /// then asked to restore the components they created. Records whose
    /// participant is missing are kept and written back on the next save.
    pub fn load_session(&self, dir: &Path) -> SessionResult<()> {
        self.begin_change("load a session");
        if self.state() != SessionState::NotLoaded {
            return Err(SessionError::SessionAlreadyLoaded);
        }
        let doc = SessionDocument::read(dir).inspect_err(|err| self.report_error(err.to_string()))?;

        self.data.borrow_mut().directory = Some(dir.to_path_buf());
        self.set_state(SessionState::Loading);
        self.apply_document(dir, doc);
        self.set_state(SessionState::LoadedClean);
        tracing::info!(target: "session", directory = %dir.display(), "session loaded");
        Ok(())
    }

    fn apply_document(&self, dir: &Path, doc: SessionDocument) {
        let SessionDocument {
            sample_rate,
            sample_channel_count,
            visibility,
            zones,
            participants,
            effects,
            targets,
            sampler,
            selected_effect,
            selected_target,
            ..
        } = doc;

        if let Err(err) = self
            .set_sample_rate(sample_rate.map(|r| r.hz()))
            .and_then(|()| self.set_sample_channel_count(sample_channel_count))
        {
            self.report_error(err.to_string());
        }
        for (field, visible) in self.visibility().changes_to(&visibility) {
            self.set_property_visible(field, visible);
        }

        for record in zones {
            let zone = self.restore_zone(dir, &record);
            self.insert_zone(zone, record.selected, None);
        }

        for record in participants {
            let Some(key) = self.find_participant(record.id.as_str()) else {
                tracing::warn!(target: "session", participant = %record.id, "saved participant is not registered");
                self.data.borrow_mut().orphans.participants.push(record);
                continue;
            };
            if record.active {
                if !self.is_participant_active(key) {
                    self.activate_participant_with(key, record.state);
                }
            } else if let Some(entry) = self.data.borrow_mut().participants.get_mut(&key) {
                entry.saved_state = record.state;
            }
        }

        for record in effects {
            self.restore_component(RecordKind::Effect, record);
        }
        for record in targets {
            self.restore_component(RecordKind::Target, record);
        }
        if let Some(record) = sampler {
            self.restore_component(RecordKind::Sampler, record);
        }

        if let Some(id) = selected_effect.and_then(|i| self.effect_at(i)) {
            self.set_selected_effect(Some(id));
        }
        if let Some(id) = selected_target.and_then(|i| self.target_at(i)) {
            self.set_selected_target(Some(id));
        }
    }

    fn restore_zone(&self, dir: &Path, record: &ZoneRecord) -> Zone {
        let mut zone = record.zone.clone();
        let read = |sample: &Option<SampleRecord>| -> Option<Arc<Sample>> {
            let sample = sample.as_ref()?;
            match sample.read(dir) {
                Ok(sample) => Some(Arc::new(sample)),
                Err(err) => {
                    self.report_error(err.to_string());
                    None
                }
            }
        };
        zone.dry_sample = read(&record.dry_sample);
        zone.wet_sample = read(&record.wet_sample);
        zone
    }

    fn restore_component(&self, kind: RecordKind, record: ComponentRecord) {
        let context = self
            .find_participant(record.participant.as_str())
            .and_then(|key| Some((self.context(key)?, self.participant(key)?)));
        let Some((context, participant)) = context else {
            tracing::warn!(target: "session", participant = %record.participant, "no active participant to restore component");
            let mut data = self.data.borrow_mut();
            match kind {
                RecordKind::Effect => data.orphans.effects.push(record),
                RecordKind::Target => data.orphans.targets.push(record),
                RecordKind::Sampler => data.orphans.sampler = Some(record),
            }
            return;
        };
        match kind {
            RecordKind::Effect => participant.restore_effect(&context, &record.state),
            RecordKind::Target => participant.restore_target(&context, &record.state),
            RecordKind::Sampler => participant.restore_sampler(&context, &record.state),
        }
    }

    /// Save to the session's own directory.
    pub fn save_session(&self) -> SessionResult<()> {
        let dir = self.directory().ok_or(SessionError::SessionNotLoaded)?;
        self.save_to(&dir)
    }

    /// Save to `dir`, which becomes the session directory.
    pub fn save_session_as(&self, dir: &Path) -> SessionResult<()> {
        if self.directory().as_deref() != Some(dir) && SessionDocument::exists(dir) {
            return Err(SessionError::SessionExists {
                path: dir.to_path_buf(),
            });
        }
        fs::create_dir_all(dir).map_err(|e| SessionError::io(dir, e))?;
        self.save_to(dir)
    }

    fn save_to(&self, dir: &Path) -> SessionResult<()> {
        self.begin_change("save the session");
        let previous = self.state();
        if !previous.is_loaded() {
            return Err(SessionError::SessionNotLoaded);
        }
        self.data.borrow_mut().directory = Some(dir.to_path_buf());
        self.set_state(SessionState::Saving);
        match self.write_session(dir) {
            Ok(()) => {
                self.set_state(SessionState::LoadedClean);
                tracing::info!(target: "session", directory = %dir.display(), "session saved");
                Ok(())
            }
            Err(err) => {
                self.set_state(previous);
                self.report_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Write sample files into a staging directory, then swap them in and
    /// replace the session file. The previous save stays intact until every
    /// sample is written.
    fn write_session(&self, dir: &Path) -> SessionResult<()> {
        let staging = dir.join(SAMPLE_STAGING_DIRECTORY_NAME);
        let result = self
            .build_document(&staging)
            .and_then(|doc| commit_save(dir, &staging, &doc));
        if result.is_err()
            && staging.is_dir()
            && let Err(err) = fs::remove_dir_all(&staging)
        {
            tracing::warn!(target: "session", path = %staging.display(), %err, "failed to remove staged samples");
        }
        result
    }

    fn build_document(&self, staging: &Path) -> SessionResult<SessionDocument> {
        if staging.is_dir() {
            fs::remove_dir_all(staging).map_err(|e| SessionError::io(staging, e))?;
        }
        fs::create_dir(staging).map_err(|e| SessionError::io(staging, e))?;

        let mut doc = {
            let data = self.data.borrow();
            let mut doc = SessionDocument::new(data.sample_rate, data.channel_count);
            doc.visibility = data.visibility.clone();
            doc.selected_effect = data
                .selected_effect
                .and_then(|id| data.effects.get_index_of(&id));
            doc.selected_target = data
                .selected_target
                .and_then(|id| data.targets.get_index_of(&id));
            doc
        };

        let zones: Vec<(Zone, bool)> = self
            .data
            .borrow()
            .zones
            .values()
            .map(|e| (e.zone.clone(), e.selected))
            .collect();
        for (index, (zone, selected)) in zones.into_iter().enumerate() {
            let dry_sample = zone
                .dry_sample
                .as_deref()
                .map(|s| SampleRecord::write_in(staging, format!("zone-{index}-dry.f32"), s))
                .transpose()?;
            let wet_sample = zone
                .wet_sample
                .as_deref()
                .map(|s| SampleRecord::write_in(staging, format!("zone-{index}-wet.f32"), s))
                .transpose()?;
            doc.zones.push(ZoneRecord {
                zone,
                selected,
                dry_sample,
                wet_sample,
            });
        }

        let participants: Vec<_> = self
            .data
            .borrow()
            .participants
            .values()
            .map(|e| {
                (
                    e.id.clone(),
                    e.active,
                    Rc::clone(&e.participant),
                    e.saved_state.clone(),
                )
            })
            .collect();
        for (id, active, participant, saved_state) in participants {
            let state = if active {
                participant.state()
            } else {
                saved_state
            };
            doc.participants.push(ParticipantRecord { id, active, state });
        }

        let effects: Vec<_> = self
            .data
            .borrow()
            .effects
            .iter()
            .map(|(id, e)| (*id, e.creator))
            .collect();
        for (effect, creator) in effects {
            if let Some(record) = self.component_record(creator, |p| p.effect_state(effect)) {
                doc.effects.push(record);
            }
        }
        let targets: Vec<_> = self
            .data
            .borrow()
            .targets
            .iter()
            .map(|(id, e)| (*id, e.creator))
            .collect();
        for (target, creator) in targets {
            if let Some(record) = self.component_record(creator, |p| p.target_state(target)) {
                doc.targets.push(record);
            }
        }
        let sampler = self
            .data
            .borrow()
            .sampler
            .as_ref()
            .map(|(id, e)| (*id, e.creator));
        if let Some((sampler, creator)) = sampler {
            doc.sampler = self.component_record(creator, |p| p.sampler_state(sampler));
        }

        let data = self.data.borrow();
        doc.participants
            .extend(data.orphans.participants.iter().cloned());
        doc.effects.extend(data.orphans.effects.iter().cloned());
        doc.targets.extend(data.orphans.targets.iter().cloned());
        if doc.sampler.is_none() {
            doc.sampler = data.orphans.sampler.clone();
        }
        Ok(doc)
    }

    fn component_record(
        &self,
        creator: ParticipantKey,
        state: impl FnOnce(&dyn Participant) -> Value,
    ) -> Option<ComponentRecord> {
        let participant = self.participant(creator)?;
        let id = self.participant_id(creator)?;
        Some(ComponentRecord {
            participant: id,
            state: state(participant.as_ref()),
        })
    }

    /// Unload the session: deactivate every participant and drop zones and
    /// jobs.
    pub fn unload_session(&self) -> SessionResult<()> {
        self.begin_change("unload the session");
        if !self.state().is_loaded() {
            return Err(SessionError::SessionNotLoaded);
        }
        self.set_state(SessionState::Unloading);

        for key in self.participant_keys().into_iter().rev() {
            if self.is_participant_active(key) {
                self.deactivate_participant(key);
            }
        }
        self.discard_all_jobs();
        let zones: Vec<_> = self.data.borrow().zones.keys().copied().collect();
        for zone in zones.into_iter().rev() {
            self.remove_zone(zone);
        }
        for (field, visible) in self
            .visibility()
            .changes_to(&PropertyVisibility::default())
        {
            self.set_property_visible(field, visible);
        }
        self.set_sample_rate(None)?;

        {
            let mut data = self.data.borrow_mut();
            data.orphans = Default::default();
            for entry in data.participants.values_mut() {
                entry.saved_state = Value::Null;
            }
        }
        self.set_state(SessionState::NotLoaded);
        self.data.borrow_mut().directory = None;
        tracing::info!(target: "session", "session unloaded");
        Ok(())
    }

    /// Unload the session if one is loaded and flag the host to quit.
    pub fn quit_session(&self) -> SessionResult<()> {
        if self.state().is_loaded() {
            self.unload_session()?;
        }
        self.data.borrow_mut().quit_requested = true;
        tracing::info!(target: "session", "quit requested");
        Ok(())
    }
}

/// Replace the sample directory of `dir` with `staging` and write `doc`.
/// On failure the previous sample directory is put back.
fn commit_save(dir: &Path, staging: &Path, doc: &SessionDocument) -> SessionResult<()> {
    let samples = dir.join(SAMPLE_DIRECTORY_NAME);
    let backup = dir.join(SAMPLE_BACKUP_DIRECTORY_NAME);
    if backup.is_dir() {
        fs::remove_dir_all(&backup).map_err(|e| SessionError::io(&backup, e))?;
    }
    let had_samples = samples.is_dir();
    if had_samples {
        fs::rename(&samples, &backup).map_err(|e| SessionError::io(&samples, e))?;
    }

    let swapped = fs::rename(staging, &samples)
        .map_err(|e| SessionError::io(staging, e))
        .and_then(|()| doc.write_file(dir));
    if let Err(err) = swapped {
        if had_samples {
            if samples.is_dir()
                && let Err(e) = fs::rename(&samples, staging)
            {
                tracing::error!(target: "session", path = %samples.display(), err = %e, "failed to move new samples aside");
            }
            if let Err(e) = fs::rename(&backup, &samples) {
                tracing::error!(target: "session", path = %backup.display(), err = %e, "failed to restore previous samples");
            }
        }
        return Err(err);
    }

    if had_samples
        && let Err(err) = fs::remove_dir_all(&backup)
    {
        tracing::warn!(target: "session", path = %backup.display(), %err, "failed to remove previous samples");
    }
    Ok(())
}
