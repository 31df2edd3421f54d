use std::collections::HashSet;

use tracing::warn;

use crate::calendar::{self, CalendarEvent};
use crate::conflict::overlapping_pairs;
use crate::model::*;
use crate::store::RemoteBooking;

use super::ReconcileError;

/// A local change, applied before the store has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Carries a placeholder identity.
    Create(Reservation),
    /// Edit form: every field may change.
    Edit {
        id: ReservationId,
        purpose: String,
        pic: String,
        span: Span,
    },
    /// Drag or resize: only the times change.
    Reschedule { id: ReservationId, span: Span },
    Delete { id: ReservationId },
}

impl Mutation {
    pub fn target(&self) -> &ReservationId {
        match self {
            Mutation::Create(r) => &r.id,
            Mutation::Edit { id, .. } | Mutation::Reschedule { id, .. } | Mutation::Delete { id } => id,
        }
    }
}

/// Exactly what `Ledger::revert` needs to undo one `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    Remove(ReservationId),
    /// `applied` is what the mutation wrote; `prior` goes back only over that.
    Restore { prior: Entry, applied: Entry },
    Unmark { id: ReservationId, status: SyncStatus },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// The canonical reservation set, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<Entry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &ReservationId) -> Option<usize> {
        self.entries.iter().position(|e| &e.reservation.id == id)
    }

    pub fn get(&self, id: &ReservationId) -> Option<&Entry> {
        self.position(id).map(|pos| &self.entries[pos])
    }

    /// Every reservation that holds its slot, pending deletes included.
    pub fn occupying(&self) -> impl Iterator<Item = &Reservation> {
        self.entries.iter().map(|e| &e.reservation)
    }

    /// Reservations the calendar shows.
    pub fn visible(&self) -> impl Iterator<Item = &Reservation> {
        self.entries
            .iter()
            .filter(|e| e.is_visible())
            .map(|e| &e.reservation)
    }

    pub fn projection(&self) -> Vec<CalendarEvent> {
        calendar::project(self.visible())
    }

    /// Apply a mutation optimistically and return its inverse.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<Undo, ReconcileError> {
        match mutation {
            Mutation::Create(r) => {
                self.entries.push(Entry {
                    reservation: r.clone(),
                    status: SyncStatus::PendingCreate,
                });
                Ok(Undo::Remove(r.id.clone()))
            }
            Mutation::Edit { id, purpose, pic, span } => {
                let entry = self.visible_entry_mut(id)?;
                let prior = entry.clone();
                entry.reservation.purpose = purpose.clone();
                entry.reservation.pic = pic.clone();
                entry.reservation.span = *span;
                entry.status = SyncStatus::PendingUpdate;
                Ok(Undo::Restore {
                    prior,
                    applied: entry.clone(),
                })
            }
            Mutation::Reschedule { id, span } => {
                let entry = self.visible_entry_mut(id)?;
                let prior = entry.clone();
                entry.reservation.span = *span;
                entry.status = SyncStatus::PendingUpdate;
                Ok(Undo::Restore {
                    prior,
                    applied: entry.clone(),
                })
            }
            Mutation::Delete { id } => {
                let entry = self.visible_entry_mut(id)?;
                let status = entry.status;
                entry.status = SyncStatus::PendingDelete;
                Ok(Undo::Unmark {
                    id: id.clone(),
                    status,
                })
            }
        }
    }

    fn visible_entry_mut(&mut self, id: &ReservationId) -> Result<&mut Entry, ReconcileError> {
        self.entries
            .iter_mut()
            .find(|e| &e.reservation.id == id && e.is_visible())
            .ok_or_else(|| ReconcileError::NotFound(id.clone()))
    }

    /// Undo an `apply`. An entry that a refresh has since replaced or removed
    /// is left alone: the refreshed list already reflects the store.
    pub fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Remove(id) => {
                self.remove(&id);
            }
            Undo::Restore { prior, applied } => {
                if let Some(pos) = self.position(&prior.reservation.id)
                    && self.entries[pos] == applied
                {
                    self.entries[pos] = prior;
                }
            }
            Undo::Unmark { id, status } => {
                if let Some(pos) = self.position(&id)
                    && self.entries[pos].status == SyncStatus::PendingDelete
                {
                    self.entries[pos].status = status;
                }
            }
        }
    }

    /// Swap the entry for `id` (placeholder or stored) with the store's record.
    pub fn confirm(&mut self, id: &ReservationId, authoritative: Reservation) {
        let pos = self
            .position(id)
            .or_else(|| self.position(&authoritative.id));
        let entry = Entry::confirmed(authoritative);
        match pos {
            Some(pos) => self.entries[pos] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, id: &ReservationId) -> Option<Entry> {
        self.position(id).map(|pos| self.entries.remove(pos))
    }

    /// Replace everything with the store's list. Undecodable and duplicate records are skipped.
    pub fn refresh(&mut self, remote: &[RemoteBooking]) -> RefreshReport {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(remote.len());
        let mut skipped = 0;
        for record in remote {
            match Reservation::from_remote(record) {
                Ok(r) if seen.insert(r.id.clone()) => entries.push(Entry::confirmed(r)),
                Ok(r) => {
                    warn!("skipping duplicate booking {}", r.id);
                    skipped += 1;
                }
                Err(e) => {
                    warn!("skipping booking: {e}");
                    skipped += 1;
                }
            }
        }
        self.entries = entries;

        let reservations: Vec<Reservation> = self.occupying().cloned().collect();
        for (a, b) in overlapping_pairs(&reservations) {
            warn!("store returned overlapping bookings {} and {}", a.id, b.id);
        }

        RefreshReport {
            loaded: self.entries.len(),
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(id: &str, start: &str, end: &str) -> Reservation {
        Reservation {
            id: ReservationId::from_store(id),
            purpose: "Sync".into(),
            pic: "Ana".into(),
            span: Span::new(at(start), at(end)),
        }
    }

    fn remote(id: &str, start: &str, end: &str) -> RemoteBooking {
        RemoteBooking {
            id: id.into(),
            purpose: "Sync".into(),
            pic: Some("Ana".into()),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    fn seeded() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.refresh(&[
            remote("1", "2025-03-03T09:00", "2025-03-03T10:00"),
            remote("2", "2025-03-03T10:00", "2025-03-03T11:00"),
        ]);
        ledger
    }

    #[test]
    fn create_then_revert_is_exact() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let mut r = res("x", "2025-03-03 12:00", "2025-03-03 13:00");
        r.id = ReservationId::placeholder();
        let undo = ledger.apply(&Mutation::Create(r)).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.entries()[2].status, SyncStatus::PendingCreate);
        ledger.revert(undo);
        assert_eq!(ledger, before);
    }

    #[test]
    fn reschedule_then_revert_is_exact() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let id = ReservationId::from_store("1");
        let span = Span::new(at("2025-03-03 13:00"), at("2025-03-03 14:00"));
        let undo = ledger
            .apply(&Mutation::Reschedule { id: id.clone(), span })
            .unwrap();
        assert_eq!(ledger.get(&id).unwrap().reservation.span, span);
        assert_eq!(ledger.get(&id).unwrap().status, SyncStatus::PendingUpdate);
        ledger.revert(undo);
        assert_eq!(ledger, before);
    }

    #[test]
    fn delete_hides_but_keeps_slot() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let id = ReservationId::from_store("1");
        let undo = ledger.apply(&Mutation::Delete { id: id.clone() }).unwrap();
        assert_eq!(ledger.visible().count(), 1);
        assert_eq!(ledger.occupying().count(), 2);
        assert_eq!(ledger.projection().len(), 1);

        // A second delete of a hidden entry finds nothing.
        assert_eq!(
            ledger.apply(&Mutation::Delete { id: id.clone() }),
            Err(ReconcileError::NotFound(id))
        );

        ledger.revert(undo);
        assert_eq!(ledger, before);
    }

    #[test]
    fn confirm_swaps_placeholder_in_place() {
        let mut ledger = seeded();
        let mut r = res("ignored", "2025-03-03 12:00", "2025-03-03 13:00");
        let tmp = ReservationId::placeholder();
        r.id = tmp.clone();
        ledger.apply(&Mutation::Create(r)).unwrap();
        ledger.confirm(&tmp, res("3", "2025-03-03 12:00", "2025-03-03 13:00"));
        assert!(ledger.get(&tmp).is_none());
        let e = ledger.get(&ReservationId::from_store("3")).unwrap();
        assert_eq!(e.status, SyncStatus::Confirmed);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn confirm_after_refresh_does_not_duplicate() {
        let mut ledger = seeded();
        let tmp = ReservationId::placeholder();
        ledger.confirm(&tmp, res("2", "2025-03-03 10:00", "2025-03-03 11:00"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn edit_of_missing_entry_fails() {
        let mut ledger = seeded();
        let id = ReservationId::from_store("9");
        let err = ledger
            .apply(&Mutation::Edit {
                id: id.clone(),
                purpose: "p".into(),
                pic: "q".into(),
                span: Span::new(at("2025-03-03 12:00"), at("2025-03-03 13:00")),
            })
            .unwrap_err();
        assert_eq!(err, ReconcileError::NotFound(id));
    }

    #[test]
    fn refresh_is_idempotent_and_skips_bad_records() {
        let list = vec![
            remote("1", "2025-03-03T09:00", "2025-03-03T10:00"),
            remote("bad", "2025-03-03T11:00", "2025-03-03T10:00"),
            remote("1", "2025-03-03T12:00", "2025-03-03T13:00"),
            remote("2", "2025-03-03T10:00", "2025-03-03T11:00"),
        ];
        let mut ledger = Ledger::new();
        let first = ledger.refresh(&list);
        let snapshot = ledger.clone();
        let second = ledger.refresh(&list);
        assert_eq!(ledger, snapshot);
        assert_eq!(first, second);
        assert_eq!(first, RefreshReport { loaded: 2, skipped: 2 });
    }

    #[test]
    fn revert_keeps_a_record_refreshed_mid_flight() {
        let mut ledger = seeded();
        let id = ReservationId::from_store("1");
        let undo = ledger
            .apply(&Mutation::Edit {
                id: id.clone(),
                purpose: "Mine".into(),
                pic: "Ana".into(),
                span: Span::new(at("2025-03-03 09:00"), at("2025-03-03 10:00")),
            })
            .unwrap();

        let mut theirs = remote("1", "2025-03-03T09:00", "2025-03-03T10:00");
        theirs.purpose = "Theirs".into();
        ledger.refresh(&[theirs, remote("2", "2025-03-03T10:00", "2025-03-03T11:00")]);
        let refreshed = ledger.clone();

        ledger.revert(undo);
        assert_eq!(ledger, refreshed);
        assert_eq!(ledger.get(&id).unwrap().reservation.purpose, "Theirs");
    }

    #[test]
    fn revert_of_delete_keeps_a_refreshed_entry() {
        let mut ledger = seeded();
        let id = ReservationId::from_store("1");
        let undo = ledger.apply(&Mutation::Delete { id: id.clone() }).unwrap();
        let mut moved = remote("1", "2025-03-03T12:00", "2025-03-03T13:00");
        moved.pic = Some("Budi".into());
        ledger.refresh(&[moved]);
        let refreshed = ledger.clone();

        ledger.revert(undo);
        assert_eq!(ledger, refreshed);
    }

    #[test]
    fn refresh_drops_pending_entries() {
        let mut ledger = seeded();
        let mut r = res("x", "2025-03-03 12:00", "2025-03-03 13:00");
        r.id = ReservationId::placeholder();
        let undo = ledger.apply(&Mutation::Create(r)).unwrap();
        ledger.refresh(&[remote("1", "2025-03-03T09:00", "2025-03-03T10:00")]);
        let after_refresh = ledger.clone();
        // Reverting a create a refresh already discarded changes nothing.
        ledger.revert(undo);
        assert_eq!(ledger, after_refresh);
    }
}
