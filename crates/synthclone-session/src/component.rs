//! Plugin-supplied components: effects, samplers and targets.

use serde::{Deserialize, Serialize};
use synthclone_core::{
    ComponentError, EffectId, Sample, SampleRate, SamplerId, TargetId, Zone,
};
use tokio::sync::watch;

use crate::job::{JobReporter, SamplerJobRequest};

/// Name, progress and status message of a component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    /// Progress in `0.0..=1.0`.
    pub progress: f32,
    pub status: String,
}

/// Shared state every component carries.
///
/// Changes are published on a watch channel, so progress can be reported
/// from worker threads and observed by UI code without involving the
/// session.
#[derive(Debug)]
pub struct ComponentCore {
    status: watch::Sender<ComponentStatus>,
}

impl ComponentCore {
    /// Create a core with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        let (status, _) = watch::channel(ComponentStatus {
            name: name.into(),
            ..ComponentStatus::default()
        });
        Self { status }
    }

    /// Display name.
    pub fn name(&self) -> String {
        self.status.borrow().name.clone()
    }

    /// Progress in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        self.status.borrow().progress
    }

    /// Status message.
    pub fn status(&self) -> String {
        self.status.borrow().status.clone()
    }

    /// Snapshot of everything.
    pub fn snapshot(&self) -> ComponentStatus {
        self.status.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.status.send_if_modified(|s| {
            if s.name == name {
                return false;
            }
            s.name = name;
            true
        });
    }

    /// Set progress, clamped to `0.0..=1.0`.
    pub fn set_progress(&self, progress: f32) {
        let progress = progress.clamp(0.0, 1.0);
        self.status.send_if_modified(|s| {
            if s.progress == progress {
                return false;
            }
            s.progress = progress;
            true
        });
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.status.send_if_modified(|s| {
            if s.status == status {
                return false;
            }
            s.status = status;
            true
        });
    }

    /// Watch for name, progress and status changes.
    pub fn subscribe(&self) -> watch::Receiver<ComponentStatus> {
        self.status.subscribe()
    }
}

/// Behavior shared by effects, samplers and targets.
pub trait Component: Send + Sync {
    fn core(&self) -> &ComponentCore;

    fn name(&self) -> String {
        self.core().name()
    }
}

/// Transforms a dry sample into a wet one.
pub trait Effect: Component {
    /// Process `sample` recorded for `zone`.
    ///
    /// Runs on a worker thread.
    fn process(&self, zone: &Zone, sample: &Sample) -> Result<Sample, ComponentError>;
}

/// Records and plays back samples.
pub trait Sampler: Component {
    /// Rate the backend runs at, if it is fixed.
    fn sample_rate(&self) -> Option<SampleRate> {
        None
    }

    /// Start a job. The sampler must eventually answer through `reporter`,
    /// from any thread.
    fn start_job(&self, request: SamplerJobRequest, reporter: JobReporter);

    /// Ask the running job to stop. The sampler acknowledges with
    /// [`JobReporter::aborted`].
    fn abort_job(&self);
}

/// Writes zones to some destination (an instrument file, an archive).
pub trait Target: Component {
    fn validate(&self, zones: &[Zone]) -> Result<(), ComponentError>;

    fn save(&self, zones: &[Zone]) -> Result<(), ComponentError>;
}

/// Identifies any registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    Effect(EffectId),
    Sampler(SamplerId),
    Target(TargetId),
}

impl From<EffectId> for ComponentId {
    fn from(id: EffectId) -> Self {
        Self::Effect(id)
    }
}

impl From<SamplerId> for ComponentId {
    fn from(id: SamplerId) -> Self {
        Self::Sampler(id)
    }
}

impl From<TargetId> for ComponentId {
    fn from(id: TargetId) -> Self {
        Self::Target(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_publishes_changes() {
        let core = ComponentCore::new("Trimmer");
        let mut rx = core.subscribe();
        assert!(!rx.has_changed().unwrap());

        core.set_progress(0.5);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().progress, 0.5);

        core.set_progress(0.5);
        assert!(!rx.has_changed().unwrap());

        core.set_progress(3.0);
        assert_eq!(core.progress(), 1.0);
        core.set_status("trimming");
        assert_eq!(rx.borrow_and_update().status, "trimming");
        assert_eq!(core.name(), "Trimmer");
    }
}
