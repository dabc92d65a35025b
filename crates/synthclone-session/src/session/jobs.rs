//! Effect and sampler job queues.
//!
//! Queues change only here, on the coordination thread. The head of each
//! queue is started when nothing in that queue is running; workers answer
//! through the completion channel and [`Session::process_completions`]
//! applies their results.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use synthclone_core::{JobId, ParticipantKey, Sample, Zone, ZoneId, ZoneStatus, ZoneValue};
use tokio_util::sync::CancellationToken;

use super::Session;
use super::data::{Entry, RunningJob, SessionData, check_index, insert_position};
use crate::component::Effect;
use crate::event::SessionEvent;
use crate::job::{
    EffectJob, Job, JobCompletion, JobOutcome, JobReporter, SamplerJob, SamplerJobRequest,
    SamplerJobType,
};
use crate::registration::Registration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Effect,
    Sampler,
}

impl Queue {
    fn name(self) -> &'static str {
        match self {
            Self::Effect => "effect",
            Self::Sampler => "sampler",
        }
    }

    fn jobs(self, data: &SessionData) -> &IndexMap<JobId, Entry<JobId>> {
        match self {
            Self::Effect => &data.effect_jobs,
            Self::Sampler => &data.sampler_jobs,
        }
    }

    fn jobs_mut(self, data: &mut SessionData) -> &mut IndexMap<JobId, Entry<JobId>> {
        match self {
            Self::Effect => &mut data.effect_jobs,
            Self::Sampler => &mut data.sampler_jobs,
        }
    }

    fn current(self, data: &SessionData) -> Option<&RunningJob> {
        match self {
            Self::Effect => data.current_effect_job.as_ref(),
            Self::Sampler => data.current_sampler_job.as_ref(),
        }
    }

    fn current_mut(self, data: &mut SessionData) -> &mut Option<RunningJob> {
        match self {
            Self::Effect => &mut data.current_effect_job,
            Self::Sampler => &mut data.current_sampler_job,
        }
    }

    fn adding(self, job: JobId, index: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::AddingEffectJob { job, index },
            Self::Sampler => SessionEvent::AddingSamplerJob { job, index },
        }
    }

    fn added(self, job: JobId, index: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::EffectJobAdded { job, index },
            Self::Sampler => SessionEvent::SamplerJobAdded { job, index },
        }
    }

    fn moving(self, job: JobId, from: usize, to: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::MovingEffectJob { job, from, to },
            Self::Sampler => SessionEvent::MovingSamplerJob { job, from, to },
        }
    }

    fn moved(self, job: JobId, from: usize, to: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::EffectJobMoved { job, from, to },
            Self::Sampler => SessionEvent::SamplerJobMoved { job, from, to },
        }
    }

    fn removing(self, job: JobId, index: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::RemovingEffectJob { job, index },
            Self::Sampler => SessionEvent::RemovingSamplerJob { job, index },
        }
    }

    fn removed(self, job: JobId, index: usize) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::EffectJobRemoved { job, index },
            Self::Sampler => SessionEvent::SamplerJobRemoved { job, index },
        }
    }

    fn current_changed(self, job: Option<JobId>) -> SessionEvent {
        match self {
            Self::Effect => SessionEvent::CurrentEffectJobChanged { job },
            Self::Sampler => SessionEvent::CurrentSamplerJobChanged { job },
        }
    }
}

impl Session {
    // ==================== Effect jobs ====================

    pub(crate) fn insert_effect_job(
        &self,
        zone: ZoneId,
        index: Option<usize>,
        creator: ParticipantKey,
    ) -> Registration<JobId> {
        self.insert_job(Queue::Effect, Job::Effect(EffectJob { zone }), index, creator)
    }

    pub fn effect_job(&self, id: JobId) -> Option<EffectJob> {
        match self.data.borrow().effect_jobs.get(&id)?.object {
            Job::Effect(job) => Some(job),
            Job::Sampler(_) => None,
        }
    }

    pub fn effect_job_at(&self, index: usize) -> Option<JobId> {
        self.data.borrow().effect_jobs.get_index(index).map(|(k, _)| *k)
    }

    pub fn effect_job_count(&self) -> usize {
        self.data.borrow().effect_jobs.len()
    }

    pub fn effect_job_index(&self, id: JobId) -> Option<usize> {
        self.data.borrow().effect_jobs.get_index_of(&id)
    }

    /// The running effect job.
    pub fn current_effect_job(&self) -> Option<JobId> {
        self.data.borrow().current_effect_job.as_ref().map(|r| r.id)
    }

    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn move_effect_job(&self, from: usize, to: usize) {
        self.move_job(Queue::Effect, from, to);
    }

    /// Remove an effect job. A running job is cancelled and removed at once;
    /// its late completion is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not queued.
    pub fn remove_effect_job(&self, id: JobId) {
        self.begin_change("remove an effect job");
        assert!(self.effect_job_index(id).is_some(), "unknown effect job {id}");
        self.discard_job(Queue::Effect, id);
        self.run_jobs();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove_effect_job_at(&self, index: usize) {
        match self.effect_job_at(index) {
            Some(id) => self.remove_effect_job(id),
            None => check_index(index, self.effect_job_count(), "effect job"),
        }
    }

    // ==================== Sampler jobs ====================

    pub(crate) fn insert_sampler_job(
        &self,
        kind: SamplerJobType,
        zone: ZoneId,
        index: Option<usize>,
        creator: ParticipantKey,
    ) -> Registration<JobId> {
        self.insert_job(
            Queue::Sampler,
            Job::Sampler(SamplerJob { kind, zone }),
            index,
            creator,
        )
    }

    pub fn sampler_job(&self, id: JobId) -> Option<SamplerJob> {
        match self.data.borrow().sampler_jobs.get(&id)?.object {
            Job::Sampler(job) => Some(job),
            Job::Effect(_) => None,
        }
    }

    pub fn sampler_job_at(&self, index: usize) -> Option<JobId> {
        self.data.borrow().sampler_jobs.get_index(index).map(|(k, _)| *k)
    }

    pub fn sampler_job_count(&self) -> usize {
        self.data.borrow().sampler_jobs.len()
    }

    pub fn sampler_job_index(&self, id: JobId) -> Option<usize> {
        self.data.borrow().sampler_jobs.get_index_of(&id)
    }

    /// The running sampler job.
    pub fn current_sampler_job(&self) -> Option<JobId> {
        self.data.borrow().current_sampler_job.as_ref().map(|r| r.id)
    }

    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn move_sampler_job(&self, from: usize, to: usize) {
        self.move_job(Queue::Sampler, from, to);
    }

    /// Remove a sampler job. A running job is aborted and removed at once;
    /// the sampler's late acknowledgement is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not queued.
    pub fn remove_sampler_job(&self, id: JobId) {
        self.begin_change("remove a sampler job");
        assert!(self.sampler_job_index(id).is_some(), "unknown sampler job {id}");
        self.discard_job(Queue::Sampler, id);
        self.run_jobs();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove_sampler_job_at(&self, index: usize) {
        match self.sampler_job_at(index) {
            Some(id) => self.remove_sampler_job(id),
            None => check_index(index, self.sampler_job_count(), "sampler job"),
        }
    }

    /// Ask the sampler to stop the running job.
    ///
    /// The job stays current until the sampler acknowledges; returns `false`
    /// if no sampler job is running.
    pub fn abort_current_sampler_job(&self) -> bool {
        self.begin_change("abort the sampler job");
        let (job, cancel, sampler) = {
            let mut data = self.data.borrow_mut();
            let sampler = data.sampler.as_ref().map(|(_, e)| Arc::clone(&e.object));
            let Some(running) = data.current_sampler_job.as_mut() else {
                return false;
            };
            if running.aborting {
                return true;
            }
            running.aborting = true;
            (running.id, running.cancel.clone(), sampler)
        };
        tracing::info!(target: "jobs", %job, "aborting sampler job");
        cancel.cancel();
        if let Some(sampler) = sampler {
            sampler.abort_job();
        }
        true
    }

    // ==================== Running ====================

    /// Check whether any job is running.
    pub fn has_running_jobs(&self) -> bool {
        let data = self.data.borrow();
        data.current_effect_job.is_some() || data.current_sampler_job.is_some()
    }

    /// Start the head of each idle queue.
    pub fn run_jobs(&self) {
        self.start_effect_job();
        self.start_sampler_job();
    }

    /// Apply every completion workers have sent so far. Returns how many
    /// were processed.
    pub fn process_completions(&self) -> usize {
        let completions: Vec<JobCompletion> = {
            let mut rx = self.completion_rx.borrow_mut();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        let count = completions.len();
        for completion in completions {
            self.handle_completion(completion);
        }
        if count > 0 {
            self.run_jobs();
        }
        count
    }

    /// Block until a running job completes, then apply every pending
    /// completion. Returns immediately when nothing is running.
    pub fn wait_for_completion(&self) -> usize {
        if !self.has_running_jobs() {
            return self.process_completions();
        }
        let first = self.completion_rx.borrow_mut().blocking_recv();
        match first {
            Some(completion) => {
                self.handle_completion(completion);
                let rest = self.process_completions();
                if rest == 0 {
                    self.run_jobs();
                }
                rest + 1
            }
            None => 0,
        }
    }

    fn start_effect_job(&self) {
        loop {
            let (id, zone_id, zone, chain) = {
                let data = self.data.borrow();
                if data.current_effect_job.is_some() {
                    return;
                }
                let Some((id, entry)) = data.effect_jobs.first() else {
                    return;
                };
                let zone_id = entry.object.zone();
                let zone = data.zones.get(&zone_id).map(|e| e.zone.clone());
                let chain: Vec<Arc<dyn Effect>> =
                    data.effects.values().map(|e| Arc::clone(&e.object)).collect();
                (*id, zone_id, zone, chain)
            };
            let Some(dry) = zone.as_ref().and_then(|z| z.dry_sample.clone()) else {
                self.report_error(format!("zone {zone_id} has no dry sample to process"));
                self.drop_job(Queue::Effect, id);
                continue;
            };
            let Some(zone) = zone else {
                continue;
            };

            let cancel = CancellationToken::new();
            let attempt = self.handles.next_raw();
            self.set_current(
                Queue::Effect,
                Some(RunningJob {
                    id,
                    attempt,
                    cancel: cancel.clone(),
                    aborting: false,
                }),
            );
            self.set_zone_status(zone_id, ZoneStatus::GeneratingWetSample);
            let reporter = JobReporter::new(id, attempt, self.completion_tx.clone());
            tracing::debug!(target: "jobs", job = %id, zone = %zone_id, effects = chain.len(), "starting effect job");
            rayon::spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_effect_chain(&chain, &zone, &dry, &cancel)
                }))
                .unwrap_or_else(|payload| {
                    JobOutcome::Failed(format!("effect panicked: {}", panic_message(&*payload)))
                });
                reporter.finish(outcome);
            });
            return;
        }
    }

    fn start_sampler_job(&self) {
        loop {
            let (id, job, zone, sampler, sample_rate, channels) = {
                let data = self.data.borrow();
                if data.current_sampler_job.is_some() {
                    return;
                }
                let Some((_, sampler)) = &data.sampler else {
                    return;
                };
                let Some((id, entry)) = data.sampler_jobs.first() else {
                    return;
                };
                let Job::Sampler(job) = entry.object else {
                    return;
                };
                let zone = data.zones.get(&job.zone).map(|e| e.zone.clone());
                (
                    *id,
                    job,
                    zone,
                    Arc::clone(&sampler.object),
                    data.sample_rate,
                    data.channel_count,
                )
            };
            let Some(zone) = zone else {
                self.drop_job(Queue::Sampler, id);
                continue;
            };
            let status = match job.kind {
                SamplerJobType::Sample => ZoneStatus::Sampling,
                SamplerJobType::PlayDrySample if zone.dry_sample.is_some() => {
                    ZoneStatus::PlayingDrySample
                }
                SamplerJobType::PlayWetSample if zone.wet_sample.is_some() => {
                    ZoneStatus::PlayingWetSample
                }
                kind => {
                    self.report_error(format!("zone {} has nothing to {kind}", job.zone));
                    self.drop_job(Queue::Sampler, id);
                    continue;
                }
            };

            let cancel = CancellationToken::new();
            let attempt = self.handles.next_raw();
            self.set_current(
                Queue::Sampler,
                Some(RunningJob {
                    id,
                    attempt,
                    cancel: cancel.clone(),
                    aborting: false,
                }),
            );
            self.set_zone_status(job.zone, status);
            let request = SamplerJobRequest {
                job: id,
                kind: job.kind,
                zone,
                sample_rate,
                channels,
                cancel,
            };
            let reporter = JobReporter::new(id, attempt, self.completion_tx.clone());
            tracing::debug!(target: "jobs", job = %id, kind = %job.kind, "starting sampler job");
            sampler.start_job(request, reporter);
            return;
        }
    }

    fn handle_completion(&self, completion: JobCompletion) {
        let JobCompletion {
            job,
            attempt,
            outcome,
        } = completion;
        let (queue, zone) = {
            let data = self.data.borrow();
            let queue = [Queue::Effect, Queue::Sampler]
                .into_iter()
                .find(|q| q.current(&data).is_some_and(|r| r.id == job && r.attempt == attempt));
            let Some(queue) = queue else {
                tracing::debug!(target: "jobs", %job, "ignoring completion of a job that is no longer running");
                return;
            };
            let Some(entry) = queue.jobs(&data).get(&job) else {
                return;
            };
            (queue, entry.object.zone())
        };

        self.set_current(queue, None);
        self.set_zone_status(zone, ZoneStatus::Normal);
        match outcome {
            JobOutcome::Sampled(sample) => self.store_sample(zone, sample, true),
            JobOutcome::EffectsApplied(sample) => self.store_sample(zone, sample, false),
            JobOutcome::Played => {}
            JobOutcome::Failed(message) => {
                self.report_error(format!("{} job for zone {zone} failed: {message}", queue.name()));
            }
            JobOutcome::Aborted => {
                tracing::info!(target: "jobs", %job, "{} job aborted", queue.name());
            }
        }
        self.drop_job(queue, job);
    }

    fn store_sample(&self, zone: ZoneId, sample: Sample, dry: bool) {
        let sample = Some(Arc::new(sample));
        let value = if dry {
            ZoneValue::DrySample(sample)
        } else {
            ZoneValue::WetSample(sample)
        };
        if let Err(err) = self.set_zone_property(zone, value) {
            self.report_error(err.to_string());
        }
    }

    // ==================== Queue plumbing ====================

    fn insert_job(
        &self,
        queue: Queue,
        job: Job,
        index: Option<usize>,
        creator: ParticipantKey,
    ) -> Registration<JobId> {
        self.begin_change("add a job");
        let index = {
            let data = self.data.borrow();
            assert!(
                data.zones.contains_key(&job.zone()),
                "cannot queue a job for unknown zone {}",
                job.zone()
            );
            insert_position(index, queue.jobs(&data).len(), "job")
        };
        let id: JobId = self.handles.allocate();
        self.announce(queue.adding(id, index));
        let registration = Registration::new(id);
        queue.jobs_mut(&mut self.data.borrow_mut()).shift_insert(
            index,
            id,
            Entry {
                object: job,
                creator,
                registration: registration.clone(),
            },
        );
        tracing::debug!(target: "jobs", job = %id, index, "{} job queued", queue.name());
        self.emit(queue.added(id, index));
        self.run_jobs();
        registration
    }

    fn move_job(&self, queue: Queue, from: usize, to: usize) {
        self.begin_change("move a job");
        let id = {
            let data = self.data.borrow();
            let jobs = queue.jobs(&data);
            check_index(to, jobs.len(), "job");
            match jobs.get_index(from) {
                Some((id, _)) => *id,
                None => panic!("job index {from} is out of range"),
            }
        };
        if from == to {
            return;
        }
        self.announce(queue.moving(id, from, to));
        queue.jobs_mut(&mut self.data.borrow_mut()).move_index(from, to);
        self.emit(queue.moved(id, from, to));
    }

    fn set_current(&self, queue: Queue, running: Option<RunningJob>) {
        let job = running.as_ref().map(|r| r.id);
        *queue.current_mut(&mut self.data.borrow_mut()) = running;
        self.emit(queue.current_changed(job));
    }

    /// Remove a job right away, stopping it first if it is running.
    fn discard_job(&self, queue: Queue, id: JobId) {
        let running = {
            let data = self.data.borrow();
            queue.current(&data).is_some_and(|r| r.id == id)
        };
        if running {
            self.stop_current(queue);
        }
        self.drop_job(queue, id);
    }

    /// Stop the running job of `queue` without waiting for the worker. The
    /// job stays queued.
    fn stop_current(&self, queue: Queue) {
        let (running, sampler) = {
            let mut data = self.data.borrow_mut();
            let sampler = data.sampler.as_ref().map(|(_, e)| Arc::clone(&e.object));
            (queue.current_mut(&mut data).take(), sampler)
        };
        let Some(running) = running else {
            return;
        };
        running.cancel.cancel();
        if queue == Queue::Sampler
            && !running.aborting
            && let Some(sampler) = sampler
        {
            sampler.abort_job();
        }
        self.emit(queue.current_changed(None));
        let zone = queue
            .jobs(&self.data.borrow())
            .get(&running.id)
            .map(|e| e.object.zone());
        if let Some(zone) = zone {
            self.set_zone_status(zone, ZoneStatus::Normal);
        }
    }

    /// Put the running sampler job back at the head of the queue.
    pub(super) fn requeue_sampler_job(&self) {
        if self.current_sampler_job().is_some() {
            tracing::info!(target: "jobs", "requeueing running sampler job");
            self.stop_current(Queue::Sampler);
        }
    }

    fn drop_job(&self, queue: Queue, id: JobId) {
        let Some(index) = queue.jobs(&self.data.borrow()).get_index_of(&id) else {
            return;
        };
        self.announce(queue.removing(id, index));
        let entry = queue.jobs_mut(&mut self.data.borrow_mut()).shift_remove(&id);
        if let Some(entry) = entry {
            entry.registration.fire(&entry.object);
        }
        tracing::debug!(target: "jobs", job = %id, "{} job removed", queue.name());
        self.emit(queue.removed(id, index));
    }

    pub(super) fn discard_jobs_for_zone(&self, zone: ZoneId) {
        for queue in [Queue::Effect, Queue::Sampler] {
            let ids: Vec<JobId> = queue
                .jobs(&self.data.borrow())
                .iter()
                .filter(|(_, e)| e.object.zone() == zone)
                .map(|(k, _)| *k)
                .collect();
            for id in ids.into_iter().rev() {
                self.discard_job(queue, id);
            }
        }
    }

    pub(super) fn discard_all_jobs(&self) {
        for queue in [Queue::Effect, Queue::Sampler] {
            let ids: Vec<JobId> = queue.jobs(&self.data.borrow()).keys().copied().collect();
            for id in ids.into_iter().rev() {
                self.discard_job(queue, id);
            }
        }
    }
}

fn run_effect_chain(
    chain: &[Arc<dyn Effect>],
    zone: &Zone,
    dry: &Sample,
    cancel: &CancellationToken,
) -> JobOutcome {
    let mut sample = dry.clone();
    for effect in chain {
        if cancel.is_cancelled() {
            return JobOutcome::Aborted;
        }
        match effect.process(zone, &sample) {
            Ok(wet) => sample = wet,
            Err(err) => return JobOutcome::Failed(err.to_string()),
        }
    }
    JobOutcome::EffectsApplied(sample)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
