//! Single-threaded event bus keyed by event kind.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{EventKind, SessionEvent};

type Listener = Rc<dyn Fn(&SessionEvent)>;

static NEXT_BUS: AtomicU64 = AtomicU64::new(1);

/// Identifies one subscription on an [`EventBus`]. Only the bus that
/// issued it accepts it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    bus: u64,
    kind: EventKind,
    id: u64,
}

impl SubscriptionId {
    /// Kind the subscription listens to.
    pub fn kind(self) -> EventKind {
        self.kind
    }
}

/// Dispatches events to listeners registered per [`EventKind`].
///
/// Listeners may subscribe, unsubscribe or emit from inside a callback; each
/// emit works on a snapshot of the listeners present when it started.
pub struct EventBus {
    id: u64,
    listeners: RefCell<HashMap<EventKind, Vec<(u64, Listener)>>>,
    next_id: Cell<u64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            id: NEXT_BUS.fetch_add(1, Ordering::Relaxed),
            listeners: RefCell::default(),
            next_id: Cell::new(0),
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        f.debug_struct("EventBus")
            .field("kinds", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        SubscriptionId {
            bus: self.id,
            kind,
            id,
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone or was
    /// issued by another bus.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        if subscription.bus != self.id {
            tracing::debug!(target: "session", event = subscription.kind.name(), "ignoring subscription from another bus");
            return false;
        }
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(&subscription.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&subscription.kind);
        }
        removed
    }

    /// Number of listeners for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.borrow().get(&kind).map_or(0, Vec::len)
    }

    /// Check whether anyone listens to `kind`.
    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    /// Deliver `event` to every listener of its kind, in subscription order.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.listeners.borrow().get(&kind) {
            Some(list) => list.iter().map(|(_, l)| Rc::clone(l)).collect(),
            None => return,
        };
        tracing::trace!(target: "session", event = kind.name(), listeners = snapshot.len(), "emit");
        for listener in snapshot {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.subscribe(EventKind::BuildingTargets, move |_| h.set(h.get() + 1));

        bus.emit(&SessionEvent::BuildingTargets);
        bus.emit(&SessionEvent::TargetBuildingCompleted);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::BuildingTargets, |_| {});
        assert_eq!(bus.listener_count(EventKind::BuildingTargets), 1);
        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        assert!(!bus.has_listeners(EventKind::BuildingTargets));
    }

    #[test]
    fn test_listener_may_unsubscribe_during_emit() {
        let bus = Rc::new(EventBus::new());
        let slot: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let hits = Rc::new(Cell::new(0));

        let (b, s, h) = (Rc::clone(&bus), Rc::clone(&slot), Rc::clone(&hits));
        let sub = bus.subscribe(EventKind::BuildingTargets, move |_| {
            h.set(h.get() + 1);
            if let Some(sub) = s.get() {
                b.unsubscribe(sub);
            }
        });
        slot.set(Some(sub));

        bus.emit(&SessionEvent::BuildingTargets);
        bus.emit(&SessionEvent::BuildingTargets);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_subscription_from_another_bus_is_rejected() {
        let first = EventBus::new();
        let second = EventBus::new();
        let mine = first.subscribe(EventKind::BuildingTargets, |_| {});
        let theirs = second.subscribe(EventKind::BuildingTargets, |_| {});
        assert_eq!(mine.kind(), theirs.kind());

        assert!(!first.unsubscribe(theirs));
        assert_eq!(first.listener_count(EventKind::BuildingTargets), 1);
        assert!(second.unsubscribe(theirs));
        assert!(first.unsubscribe(mine));
    }
}
