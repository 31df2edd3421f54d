mod error;
mod ledger;
mod mutations;
mod queries;
mod validate;

pub use error::{
    ReconcileError, ValidationError, MSG_CONFLICT, MSG_END_AFTER_START, MSG_OUT_OF_WINDOW,
    MSG_REQUIRED, MSG_START_BEFORE_END,
};
pub use ledger::{Ledger, Mutation, RefreshReport, Undo};
pub use mutations::{PendingMutation, Settled};
pub use validate::{validate, validate_interval};

use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::calendar::{CalendarView, ViewMode};
use crate::config::ReconcilerConfig;
use crate::model::ReservationId;
use crate::notify::{Change, ChangeHub};
use crate::store::BookingStore;

type InFlightMap = Arc<DashMap<ReservationId, Ulid>>;

/// Claim on a reservation identity while one of its mutations is unsettled.
/// Released on drop.
#[derive(Debug)]
pub(crate) struct InFlight {
    map: InFlightMap,
    id: ReservationId,
    token: Ulid,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.map.remove_if(&self.id, |_, token| *token == self.token);
    }
}

/// Owns the canonical reservation set and mediates every change to it.
///
/// All mutation paths (form submit, drag, resize, delete) go through the same
/// sequence: claim the identity, validate and apply under the ledger write lock,
/// call the store with the lock released, then confirm or revert.
pub struct Reconciler {
    store: Arc<dyn BookingStore>,
    ledger: RwLock<Ledger>,
    in_flight: InFlightMap,
    hub: Arc<ChangeHub>,
    config: ReconcilerConfig,
    view: Option<Arc<dyn CalendarView>>,
    view_mode: RwLock<ViewMode>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BookingStore>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            ledger: RwLock::new(Ledger::new()),
            in_flight: Arc::new(DashMap::new()),
            hub: Arc::new(ChangeHub::new()),
            config,
            view: None,
            view_mode: RwLock::new(ViewMode::default()),
        }
    }

    /// Attach the calendar handle that `set_view` drives.
    pub fn with_view(mut self, view: Arc<dyn CalendarView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn with_hub(mut self, hub: Arc<ChangeHub>) -> Self {
        self.hub = hub;
        self
    }

    pub fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub(crate) fn claim(&self, id: &ReservationId) -> Result<InFlight, ReconcileError> {
        match self.in_flight.entry(id.clone()) {
            MapEntry::Occupied(_) => Err(ReconcileError::MutationInFlight(id.clone())),
            MapEntry::Vacant(slot) => {
                let token = Ulid::new();
                slot.insert(token);
                Ok(InFlight {
                    map: self.in_flight.clone(),
                    id: id.clone(),
                    token,
                })
            }
        }
    }

    /// Push the current projection to subscribers. Call with the ledger lock held.
    fn publish(&self, ledger: &Ledger) {
        metrics::gauge!(crate::observability::CANONICAL_RESERVATIONS).set(ledger.len() as f64);
        self.hub.send(Change::Projection(ledger.projection()));
    }
}
