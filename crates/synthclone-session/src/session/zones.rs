//! Zone collection, zone properties and zone selection.

use itertools::Itertools;
use synthclone_core::{
    SessionResult, Zone, ZoneComparer, ZoneField, ZoneId, ZoneStatus, ZoneValue,
};

use super::Session;
use super::data::{ZoneEntry, check_index, insert_position};
use crate::event::SessionEvent;
use crate::registration::Registration;

impl Session {
    /// Add a default zone at `index` (appended for `None`).
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the end.
    pub fn add_zone(&self, index: Option<usize>) -> Registration<ZoneId> {
        self.insert_zone(Zone::default(), false, index)
    }

    pub(crate) fn insert_zone(
        &self,
        zone: Zone,
        selected: bool,
        index: Option<usize>,
    ) -> Registration<ZoneId> {
        self.begin_change("add a zone");
        let index = insert_position(index, self.zone_count(), "zone");
        let id: ZoneId = self.handles.allocate();
        self.announce(SessionEvent::AddingZone { zone: id, index });
        let registration = Registration::new(id);
        self.data.borrow_mut().zones.shift_insert(
            index,
            id,
            ZoneEntry {
                zone,
                selected,
                registration: registration.clone(),
            },
        );
        self.emit(SessionEvent::ZoneAdded { zone: id, index });
        if selected {
            self.emit(SessionEvent::ZoneSelectionChanged {
                zone: id,
                selected,
            });
        }
        self.touch();
        registration
    }

    /// Snapshot of a zone.
    pub fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.data.borrow().zones.get(&id).map(|e| e.zone.clone())
    }

    pub fn zone_at(&self, index: usize) -> Option<ZoneId> {
        self.data.borrow().zones.get_index(index).map(|(k, _)| *k)
    }

    pub fn zone_count(&self) -> usize {
        self.data.borrow().zones.len()
    }

    pub fn zone_index(&self, id: ZoneId) -> Option<usize> {
        self.data.borrow().zones.get_index_of(&id)
    }

    /// Snapshot of every zone, in order.
    pub fn zones(&self) -> Vec<Zone> {
        self.data
            .borrow()
            .zones
            .values()
            .map(|e| e.zone.clone())
            .collect()
    }

    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn move_zone(&self, from: usize, to: usize) {
        self.begin_change("move a zone");
        let id = {
            let data = self.data.borrow();
            check_index(to, data.zones.len(), "zone");
            match data.zones.get_index(from) {
                Some((id, _)) => *id,
                None => panic!("zone index {from} is out of range"),
            }
        };
        if from == to {
            return;
        }
        self.announce(SessionEvent::MovingZone { zone: id, from, to });
        self.data.borrow_mut().zones.move_index(from, to);
        self.emit(SessionEvent::ZoneMoved { zone: id, from, to });
        self.touch();
    }

    /// Remove a zone and every job queued for it.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not exist.
    pub fn remove_zone(&self, id: ZoneId) {
        self.begin_change("remove a zone");
        assert!(self.zone_index(id).is_some(), "unknown zone {id}");
        self.discard_jobs_for_zone(id);

        let index = self.zone_index(id).unwrap_or_default();
        self.announce(SessionEvent::RemovingZone { zone: id, index });
        let entry = self.data.borrow_mut().zones.shift_remove(&id);
        if let Some(entry) = entry {
            entry.registration.fire(&entry.zone);
        }
        self.emit(SessionEvent::ZoneRemoved { zone: id, index });
        self.touch();
        self.run_jobs();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove_zone_at(&self, index: usize) {
        match self.zone_at(index) {
            Some(id) => self.remove_zone(id),
            None => check_index(index, self.zone_count(), "zone"),
        }
    }

    /// Change one zone attribute after validating it.
    ///
    /// Emits [`SessionEvent::ZoneChanged`] for every attribute that changed,
    /// including stale flags implied by the change.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not exist.
    pub fn set_zone_property(&self, id: ZoneId, value: ZoneValue) -> SessionResult<()> {
        value.validate()?;
        self.begin_change("change a zone");
        let fields = {
            let mut data = self.data.borrow_mut();
            match data.zones.get_mut(&id) {
                Some(entry) => entry.zone.apply(value)?,
                None => panic!("unknown zone {id}"),
            }
        };
        for &field in &fields {
            self.emit(SessionEvent::ZoneChanged { zone: id, field });
        }
        if fields.iter().any(|f| *f != ZoneField::Status) {
            self.touch();
        }
        Ok(())
    }

    pub(super) fn set_zone_status(&self, id: ZoneId, status: ZoneStatus) {
        let changed = {
            let mut data = self.data.borrow_mut();
            match data.zones.get_mut(&id) {
                Some(entry) if entry.zone.status != status => {
                    entry.zone.status = status;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(SessionEvent::ZoneChanged {
                zone: id,
                field: ZoneField::Status,
            });
        }
    }

    // ==================== Selection ====================

    pub fn is_zone_selected(&self, id: ZoneId) -> bool {
        self.data
            .borrow()
            .zones
            .get(&id)
            .is_some_and(|e| e.selected)
    }

    /// # Panics
    ///
    /// Panics if `id` does not exist.
    pub fn set_zone_selected(&self, id: ZoneId, selected: bool) {
        self.begin_change("select a zone");
        {
            let mut data = self.data.borrow_mut();
            let Some(entry) = data.zones.get_mut(&id) else {
                panic!("unknown zone {id}");
            };
            if entry.selected == selected {
                return;
            }
            entry.selected = selected;
        }
        self.emit(SessionEvent::ZoneSelectionChanged { zone: id, selected });
    }

    pub fn set_all_zones_selected(&self, selected: bool) {
        let ids: Vec<ZoneId> = self.data.borrow().zones.keys().copied().collect();
        for id in ids {
            self.set_zone_selected(id, selected);
        }
    }

    pub fn selected_zone_count(&self) -> usize {
        self.data
            .borrow()
            .zones
            .values()
            .filter(|e| e.selected)
            .count()
    }

    /// The `index`-th selected zone, in zone order.
    pub fn selected_zone(&self, index: usize) -> Option<ZoneId> {
        self.data
            .borrow()
            .zones
            .iter()
            .filter(|(_, e)| e.selected)
            .nth(index)
            .map(|(k, _)| *k)
    }

    // ==================== Sorting ====================

    /// Stable-sort the zones, publishing each step as a zone move.
    pub fn sort_zones(&self, comparer: &dyn ZoneComparer, ascending: bool) {
        self.begin_change("sort zones");
        let order: Vec<ZoneId> = self
            .data
            .borrow()
            .zones
            .iter()
            .sorted_by(|(_, a), (_, b)| {
                let ordering = comparer.compare(&a.zone, &b.zone);
                if ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            })
            .map(|(id, _)| *id)
            .collect();

        for (position, id) in order.into_iter().enumerate() {
            if let Some(current) = self.zone_index(id)
                && current != position
            {
                self.move_zone(current, position);
            }
        }
    }
}
