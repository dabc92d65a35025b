//! Building targets from the current zones.

use synthclone_core::{ComponentError, TargetId};

use super::Session;
use crate::event::SessionEvent;

impl Session {
    /// Validate and save every target, in order.
    ///
    /// Each failure is reported through [`Session::report_error`] and
    /// published as [`SessionEvent::TargetSaveError`]; remaining targets
    /// are still built.
    pub fn build_targets(&self) -> Vec<(TargetId, Result<(), ComponentError>)> {
        self.begin_change("build targets");
        let zones = self.zones();
        let targets: Vec<_> = self
            .data
            .borrow()
            .targets
            .iter()
            .map(|(id, e)| (*id, e.object.clone()))
            .collect();

        tracing::info!(target: "session", targets = targets.len(), zones = zones.len(), "building targets");
        self.emit(SessionEvent::BuildingTargets);
        let mut results = Vec::with_capacity(targets.len());
        for (id, target) in targets {
            if self.target_index(id).is_none() {
                continue;
            }
            self.emit(SessionEvent::ValidatingTarget { target: id });
            let validation = target.validate(&zones);
            self.emit(SessionEvent::TargetValidationCompleted {
                target: id,
                error: validation.as_ref().err().map(ToString::to_string),
            });
            let result = validation.and_then(|()| {
                self.emit(SessionEvent::SavingTarget { target: id });
                target.save(&zones)
            });
            match &result {
                Ok(()) => self.emit(SessionEvent::TargetSaved { target: id }),
                Err(err) => {
                    self.emit(SessionEvent::TargetSaveError {
                        target: id,
                        message: err.message.clone(),
                    });
                    self.report_error(err.to_string());
                }
            }
            results.push((id, result));
        }
        self.emit(SessionEvent::TargetBuildingCompleted);
        results
    }
}
