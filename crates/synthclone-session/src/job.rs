//! Effect and sampler jobs, and the completion records workers send back.
//!
//! Jobs are queued and reordered only on the coordination thread. Workers
//! receive an immutable request, and answer with a [`JobCompletion`] pushed
//! through an unbounded channel that the session drains.

use std::fmt;

use serde::{Deserialize, Serialize};
use synthclone_core::{JobId, Sample, SampleChannelCount, SampleRate, Zone, ZoneId};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// What a sampler job does.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SamplerJobType {
    /// Record the zone's dry sample.
    #[strum(to_string = "sample")]
    Sample,
    /// Play back the dry sample.
    #[strum(to_string = "play dry sample")]
    PlayDrySample,
    /// Play back the wet sample.
    #[strum(to_string = "play wet sample")]
    PlayWetSample,
}

/// Run the effect chain over a zone's dry sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectJob {
    pub zone: ZoneId,
}

/// Ask the sampler to record or play a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerJob {
    pub kind: SamplerJobType,
    pub zone: ZoneId,
}

/// Either kind of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Effect(EffectJob),
    Sampler(SamplerJob),
}

impl Job {
    /// Zone the job works on.
    pub fn zone(&self) -> ZoneId {
        match self {
            Self::Effect(job) => job.zone,
            Self::Sampler(job) => job.zone,
        }
    }
}

/// Everything a sampler needs to run a job.
#[derive(Debug, Clone)]
pub struct SamplerJobRequest {
    pub job: JobId,
    pub kind: SamplerJobType,
    /// Snapshot of the zone when the job started.
    pub zone: Zone,
    pub sample_rate: Option<SampleRate>,
    pub channels: SampleChannelCount,
    /// Cancelled when the session aborts the job.
    pub cancel: CancellationToken,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// A dry sample was recorded.
    Sampled(Sample),
    /// Playback finished.
    Played,
    /// The effect chain produced a wet sample.
    EffectsApplied(Sample),
    Failed(String),
    /// The worker stopped after an abort request.
    Aborted,
}

/// Immutable record a worker pushes when a job ends.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub job: JobId,
    /// Distinguishes restarts of the same job.
    pub attempt: u64,
    pub outcome: JobOutcome,
}

/// Sends the result of one job back to the session.
///
/// Every method consumes the reporter, so a job is answered at most once. A
/// reporter dropped without an answer reports the job as failed.
pub struct JobReporter {
    job: JobId,
    attempt: u64,
    sender: Option<UnboundedSender<JobCompletion>>,
}

impl JobReporter {
    pub(crate) fn new(job: JobId, attempt: u64, sender: UnboundedSender<JobCompletion>) -> Self {
        Self {
            job,
            attempt,
            sender: Some(sender),
        }
    }

    /// Job this reporter answers for.
    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn sampled(self, sample: Sample) {
        self.finish(JobOutcome::Sampled(sample));
    }

    pub fn played(self) {
        self.finish(JobOutcome::Played);
    }

    pub fn effects_applied(self, sample: Sample) {
        self.finish(JobOutcome::EffectsApplied(sample));
    }

    pub fn failed(self, message: impl Into<String>) {
        self.finish(JobOutcome::Failed(message.into()));
    }

    /// Acknowledge an abort request.
    pub fn aborted(self) {
        self.finish(JobOutcome::Aborted);
    }

    pub(crate) fn finish(mut self, outcome: JobOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: JobOutcome) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let completion = JobCompletion {
            job: self.job,
            attempt: self.attempt,
            outcome,
        };
        if sender.send(completion).is_err() {
            tracing::debug!(target: "jobs", job = %self.job, "session is gone, dropping completion");
        }
    }
}

impl Drop for JobReporter {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::warn!(target: "jobs", job = %self.job, "job reporter dropped without an answer");
            self.send(JobOutcome::Failed("worker dropped the job".into()));
        }
    }
}

impl fmt::Debug for JobReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobReporter")
            .field("job", &self.job)
            .field("attempt", &self.attempt)
            .field("answered", &self.sender.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_reporter_sends_one_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = JobReporter::new(JobId::new(9), 1, tx);
        assert_eq!(reporter.job(), JobId::new(9));
        reporter.played();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.job, JobId::new(9));
        assert_eq!(completion.outcome, JobOutcome::Played);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_reporter_fails_the_job() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(JobReporter::new(JobId::new(4), 2, tx));

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.job, JobId::new(4));
        assert_eq!(completion.attempt, 2);
        assert_eq!(
            completion.outcome,
            JobOutcome::Failed("worker dropped the job".into())
        );
        assert!(rx.try_recv().is_err());
    }
}
