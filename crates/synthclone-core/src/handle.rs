//! Typed handles for objects owned by a session.
//!
//! Every object a session stores is addressed by a small copyable handle.
//! Handles are allocated from one monotonic counter per session and are never
//! reused, so a stale handle can only ever miss, never alias a newer object.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a handle from a raw value.
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Handle of a registered effect.
    EffectId,
    "effect"
);
handle!(
    /// Handle of the registered sampler.
    SamplerId,
    "sampler"
);
handle!(
    /// Handle of a registered target.
    TargetId,
    "target"
);
handle!(
    /// Handle of a registered participant.
    ParticipantKey,
    "participant"
);
handle!(
    /// Handle of a registered menu action.
    MenuActionId,
    "action"
);
handle!(
    /// Handle of a registered menu separator.
    MenuSeparatorId,
    "separator"
);
handle!(
    /// Handle of a zone.
    ZoneId,
    "zone"
);
handle!(
    /// Handle of a queued effect or sampler job.
    JobId,
    "job"
);

/// Monotonic handle allocator.
///
/// Lives on the coordination thread, so a `Cell` is enough.
#[derive(Debug)]
pub struct HandleAllocator {
    next: Cell<u64>,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleAllocator {
    /// Create an allocator starting at 1.
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    /// Allocate the next raw value.
    pub fn next_raw(&self) -> u64 {
        let id = self.next.get();
        self.next.set(id + 1);
        id
    }

    /// Allocate a typed handle.
    pub fn allocate<H: From<u64>>(&self) -> H {
        H::from(self.next_raw())
    }
}

macro_rules! impl_from_raw {
    ($($name:ident),*) => {
        $(
            impl From<u64> for $name {
                fn from(id: u64) -> Self {
                    Self(id)
                }
            }
        )*
    };
}

impl_from_raw!(
    EffectId,
    SamplerId,
    TargetId,
    ParticipantKey,
    MenuActionId,
    MenuSeparatorId,
    ZoneId,
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let alloc = HandleAllocator::new();
        let a: EffectId = alloc.allocate();
        let b: TargetId = alloc.allocate();
        let c: EffectId = alloc.allocate();
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(c.get(), 3);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ZoneId::new(7).to_string(), "zone#7");
        assert_eq!(ParticipantKey::new(2).to_string(), "participant#2");
    }
}
