//! Which session events a context can relay, and under what name.
//!
//! Every event kind is relayed under its own name except the session's
//! generic [`EventKind::StateChanged`], which contexts publish as
//! [`EventKind::SessionStateChanged`].

use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;

use crate::event::{EventKind, SessionEvent};

static RELAY_TABLE: LazyLock<HashMap<EventKind, EventKind>> = LazyLock::new(|| {
    EventKind::iter()
        .filter_map(|kind| match kind {
            EventKind::StateChanged => None,
            EventKind::SessionStateChanged => Some((kind, EventKind::StateChanged)),
            _ => Some((kind, kind)),
        })
        .collect()
});

/// Session event kind that feeds the context event `kind`, or `None` if
/// contexts do not publish `kind`.
pub fn relay_source(kind: EventKind) -> Option<EventKind> {
    RELAY_TABLE.get(&kind).copied()
}

/// Rewrite a session event as the context event `kind`.
pub fn relabel(event: &SessionEvent, kind: EventKind) -> SessionEvent {
    match (event, kind) {
        (SessionEvent::StateChanged { state, directory }, EventKind::SessionStateChanged) => {
            SessionEvent::SessionStateChanged {
                state: *state,
                directory: directory.clone(),
            }
        }
        _ => event.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthclone_core::SessionState;

    #[test]
    fn test_identity_for_collection_events() {
        assert_eq!(
            relay_source(EventKind::EffectAdded),
            Some(EventKind::EffectAdded)
        );
        assert_eq!(
            relay_source(EventKind::RemovingMenuAction),
            Some(EventKind::RemovingMenuAction)
        );
    }

    #[test]
    fn test_state_changed_is_renamed() {
        assert_eq!(
            relay_source(EventKind::SessionStateChanged),
            Some(EventKind::StateChanged)
        );
        assert_eq!(relay_source(EventKind::StateChanged), None);

        let event = SessionEvent::StateChanged {
            state: SessionState::LoadedDirty,
            directory: None,
        };
        let relayed = relabel(&event, EventKind::SessionStateChanged);
        assert_eq!(relayed.kind(), EventKind::SessionStateChanged);
    }

    #[test]
    fn test_table_covers_all_but_one_kind() {
        assert_eq!(RELAY_TABLE.len(), EventKind::iter().count() - 1);
    }
}
