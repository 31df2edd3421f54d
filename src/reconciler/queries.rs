use tracing::{debug, warn};

use crate::calendar::{self, CalendarEvent, Stats, ViewMode};
use crate::model::*;
use crate::notify::Change;
use crate::observability;
use crate::store::RemoteBooking;

use super::validate::validate;
use super::{ReconcileError, Reconciler, RefreshReport, ValidationError};

impl Reconciler {
    /// Fetch the store's list and replace local state with it.
    /// On failure local state is kept: stale beats falsely empty.
    pub async fn refresh(&self) -> Result<RefreshReport, ReconcileError> {
        match self.store.list().await {
            Ok(list) => Ok(self.apply_remote_list(&list).await),
            Err(e) => {
                warn!("fetching bookings failed, keeping local state: {e}");
                metrics::counter!(observability::REFRESHES_TOTAL, "status" => "failed").increment(1);
                self.hub.send(Change::FetchFailed {
                    message: e.to_string(),
                });
                Err(ReconcileError::RemoteFetch(e))
            }
        }
    }

    /// Replace local state with an already-fetched list.
    pub async fn apply_remote_list(&self, list: &[RemoteBooking]) -> RefreshReport {
        let mut ledger = self.ledger.write().await;
        let report = ledger.refresh(list);
        self.publish(&ledger);
        metrics::counter!(observability::REFRESHES_TOTAL, "status" => "ok").increment(1);
        if report.skipped > 0 {
            metrics::counter!(observability::SKIPPED_RECORDS_TOTAL).increment(report.skipped as u64);
        }
        debug!("refreshed: {} loaded, {} skipped", report.loaded, report.skipped);
        report
    }

    /// Validate a draft against the current set, skipping the reservation it edits.
    pub async fn validate(&self, draft: &Draft) -> Result<Candidate, ValidationError> {
        let ledger = self.ledger.read().await;
        validate(
            draft,
            ledger.occupying(),
            draft.editing.as_ref(),
            &self.config.window,
        )
    }

    pub async fn projection(&self) -> Vec<CalendarEvent> {
        self.ledger.read().await.projection()
    }

    /// Reservations the calendar shows, in insertion order.
    pub async fn reservations(&self) -> Vec<Reservation> {
        self.ledger.read().await.visible().cloned().collect()
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.ledger.read().await.entries().to_vec()
    }

    pub async fn get(&self, id: &ReservationId) -> Option<Entry> {
        self.ledger.read().await.get(id).cloned()
    }

    pub async fn stats(&self, now: Timestamp) -> Stats {
        let ledger = self.ledger.read().await;
        calendar::stats(ledger.visible(), now)
    }

    /// Mutations sent but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Empty slot picked on the calendar: a fresh create draft.
    pub fn on_range_select(&self, start: Timestamp, end: Timestamp) -> Draft {
        Draft::for_slot(start, end)
    }

    /// Event clicked on the calendar: an edit draft, if it is still shown.
    pub async fn on_event_click(&self, id: &ReservationId) -> Option<Draft> {
        let ledger = self.ledger.read().await;
        ledger
            .get(id)
            .filter(|e| e.is_visible())
            .map(|e| Draft::editing(&e.reservation))
    }

    pub async fn set_view(&self, mode: ViewMode) {
        *self.view_mode.write().await = mode;
        if let Some(view) = &self.view {
            view.set_view(mode);
        }
    }

    pub async fn view_mode(&self) -> ViewMode {
        *self.view_mode.read().await
    }
}
