//! The session: single owner of every collection.
//!
//! All mutation happens on the coordination thread through `&self` methods.
//! A mutation validates its input, announces the change, applies it, fires
//! the affected registration and publishes the did event. No `RefCell`
//! borrow is held while listeners or participants run, so they may call back
//! into the session from any did event. About-to events are a read-only
//! window: changing a collection while one is being delivered panics.

mod data;
mod jobs;
mod persist;
mod registry;
mod targets;
mod zones;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use synthclone_core::{
    HandleAllocator, ParticipantKey, PropertyVisibility, SampleChannelCount, SampleRate,
    SessionResult, SessionState, ZoneField, validate_channel_count,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::bus::{EventBus, SubscriptionId};
use crate::component::ComponentId;
use crate::context::Context;
use crate::event::{EventKind, SessionEvent};
use crate::job::JobCompletion;

use data::SessionData;

/// The authority over participants, components, zones, jobs and menu items.
pub struct Session {
    this: Weak<Session>,
    data: RefCell<SessionData>,
    bus: EventBus,
    handles: HandleAllocator,
    contexts: RefCell<HashMap<ParticipantKey, Context>>,
    announcing: Cell<u32>,
    completion_tx: UnboundedSender<JobCompletion>,
    completion_rx: RefCell<UnboundedReceiver<JobCompletion>>,
}

struct AnnounceGuard<'a>(&'a Cell<u32>);

impl Drop for AnnounceGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl Session {
    /// Create an empty session with no session directory loaded.
    pub fn new() -> Rc<Self> {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            data: RefCell::new(SessionData::new()),
            bus: EventBus::new(),
            handles: HandleAllocator::new(),
            contexts: RefCell::new(HashMap::new()),
            announcing: Cell::new(0),
            completion_tx,
            completion_rx: RefCell::new(completion_rx),
        })
    }

    /// The session's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Shorthand for `self.bus().subscribe(kind, listener)`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        self.bus.unsubscribe(subscription)
    }

    /// Context of an active participant.
    pub fn context(&self, participant: ParticipantKey) -> Option<Context> {
        self.contexts.borrow().get(&participant).cloned()
    }

    // ==================== Event plumbing ====================

    fn announce(&self, event: SessionEvent) {
        self.announcing.set(self.announcing.get() + 1);
        let _guard = AnnounceGuard(&self.announcing);
        self.bus.emit(&event);
    }

    fn emit(&self, event: SessionEvent) {
        self.bus.emit(&event);
    }

    /// # Panics
    ///
    /// Panics while an about-to event is being delivered.
    fn begin_change(&self, what: &str) {
        assert_eq!(
            self.announcing.get(),
            0,
            "cannot {what} while a pending change is being announced"
        );
    }

    // ==================== Lifecycle state ====================

    pub fn state(&self) -> SessionState {
        self.data.borrow().state
    }

    /// Directory of the loaded session.
    pub fn directory(&self) -> Option<PathBuf> {
        self.data.borrow().directory.clone()
    }

    fn set_state(&self, state: SessionState) {
        let directory = {
            let mut data = self.data.borrow_mut();
            if data.state == state {
                return;
            }
            data.state = state;
            data.directory.clone()
        };
        tracing::info!(target: "session", %state, directory = ?directory, "state changed");
        self.emit(SessionEvent::StateChanged { state, directory });
    }

    /// Mark a loaded session as having unsaved changes.
    pub fn set_session_modified(&self) {
        self.touch();
    }

    fn touch(&self) {
        if self.state() == SessionState::LoadedClean {
            self.set_state(SessionState::LoadedDirty);
        }
    }

    /// Check whether the host was asked to quit.
    pub fn is_quit_requested(&self) -> bool {
        self.data.borrow().quit_requested
    }

    // ==================== Sample data ====================

    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.data.borrow().sample_rate
    }

    /// Set the session sample rate in Hz, or clear it with `None`.
    ///
    /// If the registered sampler runs at a different fixed rate it is
    /// removed and an error is reported.
    pub fn set_sample_rate(&self, hz: Option<u32>) -> SessionResult<()> {
        let rate = hz.map(SampleRate::new).transpose()?;
        self.begin_change("change the sample rate");
        {
            let mut data = self.data.borrow_mut();
            if data.sample_rate == rate {
                return Ok(());
            }
            data.sample_rate = rate;
        }
        self.emit(SessionEvent::SampleRateChanged { rate });
        self.touch();
        self.check_sampler_rate();
        Ok(())
    }

    pub fn sample_channel_count(&self) -> SampleChannelCount {
        self.data.borrow().channel_count
    }

    pub fn set_sample_channel_count(&self, count: SampleChannelCount) -> SessionResult<()> {
        let count = validate_channel_count(count)?;
        self.begin_change("change the channel count");
        {
            let mut data = self.data.borrow_mut();
            if data.channel_count == count {
                return Ok(());
            }
            data.channel_count = count;
        }
        self.emit(SessionEvent::SampleChannelCountChanged { count });
        self.touch();
        Ok(())
    }

    // ==================== Property visibility ====================

    pub fn visibility(&self) -> PropertyVisibility {
        self.data.borrow().visibility.clone()
    }

    pub fn is_property_visible(&self, field: ZoneField) -> bool {
        self.data.borrow().visibility.is_visible(field)
    }

    pub fn set_property_visible(&self, field: ZoneField, visible: bool) {
        self.begin_change("change property visibility");
        let changed = self
            .data
            .borrow_mut()
            .visibility
            .set_visible(field, visible);
        if changed {
            self.emit(SessionEvent::visibility(field, visible));
            self.touch();
        }
    }

    // ==================== Focus ====================

    pub fn focused_component(&self) -> Option<ComponentId> {
        self.data.borrow().focused
    }

    /// # Panics
    ///
    /// Panics if `component` is not registered.
    pub fn set_focused_component(&self, component: Option<ComponentId>) {
        self.begin_change("change the focused component");
        {
            let mut data = self.data.borrow_mut();
            if let Some(component) = component {
                assert!(
                    data.has_component(component),
                    "cannot focus unregistered component {component:?}"
                );
            }
            if data.focused == component {
                return;
            }
            data.focused = component;
        }
        self.emit(SessionEvent::FocusedComponentChanged { component });
    }

    // ==================== Errors ====================

    /// Report a recoverable error to the user.
    pub fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: "session", %message, "error reported");
        self.emit(SessionEvent::ErrorReported { message });
    }
}
