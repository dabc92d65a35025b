//! One-shot removal notifications.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use synthclone_core::{
    EffectId, JobId, MenuActionId, MenuSeparatorId, ParticipantKey, SamplerId, TargetId, Zone,
    ZoneId,
};

use crate::component::{Effect, Sampler, Target};
use crate::job::Job;
use crate::menu::{MenuAction, MenuSeparator};
use crate::participant::Participant;

/// A handle type that can be registered with a session.
pub trait Registrable: Copy + PartialEq + fmt::Debug + 'static {
    /// What the session hands back when the subject is removed.
    type Removed;
}

impl Registrable for EffectId {
    type Removed = Arc<dyn Effect>;
}

impl Registrable for SamplerId {
    type Removed = Arc<dyn Sampler>;
}

impl Registrable for TargetId {
    type Removed = Arc<dyn Target>;
}

impl Registrable for ParticipantKey {
    type Removed = Rc<dyn Participant>;
}

impl Registrable for MenuActionId {
    type Removed = Rc<MenuAction>;
}

impl Registrable for MenuSeparatorId {
    type Removed = Rc<MenuSeparator>;
}

impl Registrable for ZoneId {
    type Removed = Zone;
}

impl Registrable for JobId {
    type Removed = Job;
}

type Callback<H> = Box<dyn FnOnce(H, &<H as Registrable>::Removed)>;

struct Inner<H: Registrable> {
    subject: H,
    fired: Cell<bool>,
    callbacks: RefCell<Vec<Callback<H>>>,
}

/// Returned by every add; fires once when its subject is removed.
///
/// The notification is delivered synchronously after the subject has left
/// its collection. A registration never keeps its subject alive: the
/// removed object is only lent to callbacks for the duration of the call.
pub struct Registration<H: Registrable> {
    inner: Rc<Inner<H>>,
}

impl<H: Registrable> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: Registrable> fmt::Debug for Registration<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("subject", &self.inner.subject)
            .field("unregistered", &self.inner.fired.get())
            .finish()
    }
}

impl<H: Registrable> Registration<H> {
    pub(crate) fn new(subject: H) -> Self {
        Self {
            inner: Rc::new(Inner {
                subject,
                fired: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Handle of the registered subject.
    pub fn id(&self) -> H {
        self.inner.subject
    }

    /// Check whether the subject has been removed.
    pub fn is_unregistered(&self) -> bool {
        self.inner.fired.get()
    }

    /// Run `callback` when the subject is removed.
    ///
    /// # Panics
    ///
    /// Panics if the subject was already removed.
    pub fn on_unregistered(&self, callback: impl FnOnce(H, &H::Removed) + 'static) {
        assert!(
            !self.inner.fired.get(),
            "{:?} is already unregistered",
            self.inner.subject
        );
        self.inner.callbacks.borrow_mut().push(Box::new(callback));
    }

    pub(crate) fn fire(&self, removed: &H::Removed) {
        assert!(
            !self.inner.fired.replace(true),
            "{:?} was unregistered twice",
            self.inner.subject
        );
        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        tracing::debug!(target: "session", subject = ?self.inner.subject, callbacks = callbacks.len(), "unregistered");
        for callback in callbacks {
            callback(self.inner.subject, removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthclone_core::ZoneId;

    #[test]
    fn test_fires_once_with_subject() {
        let reg = Registration::new(ZoneId::new(4));
        let seen = Rc::new(Cell::new(None));
        let s = Rc::clone(&seen);
        reg.on_unregistered(move |id, zone: &Zone| s.set(Some((id, zone.note))));

        assert!(!reg.is_unregistered());
        let zone = Zone {
            note: 42,
            ..Zone::default()
        };
        reg.fire(&zone);
        assert!(reg.is_unregistered());
        assert_eq!(seen.get(), Some((ZoneId::new(4), 42)));
    }

    #[test]
    #[should_panic(expected = "already unregistered")]
    fn test_callback_after_fire_panics() {
        let reg = Registration::new(ZoneId::new(1));
        reg.fire(&Zone::default());
        reg.on_unregistered(|_, _| {});
    }

    #[test]
    #[should_panic(expected = "unregistered twice")]
    fn test_double_fire_panics() {
        let reg = Registration::new(ZoneId::new(1));
        reg.fire(&Zone::default());
        reg.fire(&Zone::default());
    }
}
