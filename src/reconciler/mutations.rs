use tracing::{debug, info, warn};

use crate::model::*;
use crate::notify::Change;
use crate::observability::{self, mutation_label};
use crate::store::{BookingPatch, BookingPayload, RemoteBooking, StoreError};

use super::validate::{validate, validate_interval};
use super::{InFlight, Ledger, Mutation, ReconcileError, Reconciler, Undo};

/// An optimistic change waiting for the store's verdict.
#[derive(Debug)]
pub struct PendingMutation {
    mutation: Mutation,
    undo: Undo,
    _claim: InFlight,
}

impl PendingMutation {
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }
}

/// What the store answered with when it accepted a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Saved(RemoteBooking),
    Deleted,
}

impl Reconciler {
    /// Apply `mutation` locally without validation and return the handle needed to settle it.
    pub async fn apply_optimistic(
        &self,
        mutation: Mutation,
    ) -> Result<PendingMutation, ReconcileError> {
        let claim = self.claim(mutation.target())?;
        let mut ledger = self.ledger.write().await;
        self.stage(&mut ledger, mutation, claim)
    }

    fn stage(
        &self,
        ledger: &mut Ledger,
        mutation: Mutation,
        claim: InFlight,
    ) -> Result<PendingMutation, ReconcileError> {
        let undo = ledger.apply(&mutation)?;
        debug!("staged {} for {}", mutation_label(&mutation), mutation.target());
        self.publish(ledger);
        Ok(PendingMutation {
            mutation,
            undo,
            _claim: claim,
        })
    }

    /// Resolve a staged mutation against the store's answer.
    ///
    /// Success swaps in the authoritative record. Failure reverts the exact
    /// prior state and raises an alert.
    pub async fn reconcile(
        &self,
        pending: PendingMutation,
        result: Result<Settled, StoreError>,
    ) -> Result<Option<Reservation>, ReconcileError> {
        let kind = mutation_label(&pending.mutation);
        let target = pending.mutation.target().clone();
        let accepted = result.and_then(|settled| match settled {
            Settled::Saved(remote) => Reservation::from_remote(&remote)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            Settled::Deleted => Ok(None),
        });

        let mut ledger = self.ledger.write().await;
        let outcome = match accepted {
            Ok(Some(record)) => {
                ledger.confirm(&target, record.clone());
                info!("{kind} {target} confirmed as {}", record.id);
                Ok(Some(record))
            }
            Ok(None) => {
                ledger.remove(&target);
                info!("{kind} {target} confirmed");
                Ok(None)
            }
            Err(e) => {
                ledger.revert(pending.undo);
                warn!("{kind} {target} rejected by store, rolled back: {e}");
                metrics::counter!(observability::ROLLBACKS_TOTAL).increment(1);
                self.hub.send(Change::MutationRejected {
                    id: target.to_string(),
                    message: e.to_string(),
                });
                Err(ReconcileError::RemoteMutation(e))
            }
        };
        self.publish(&ledger);
        let status = if outcome.is_ok() { "confirmed" } else { "rolled_back" };
        metrics::counter!(observability::MUTATIONS_TOTAL, "kind" => kind, "outcome" => status)
            .increment(1);
        outcome
    }

    async fn dispatch(&self, mutation: &Mutation) -> Result<Settled, StoreError> {
        let store_id = |id: &ReservationId| {
            id.as_store_id()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Rejected(format!("{id} has no store identity")))
        };
        match mutation {
            Mutation::Create(r) => self
                .store
                .create(BookingPayload::new(&r.purpose, &r.pic, r.span))
                .await
                .map(Settled::Saved),
            Mutation::Edit { id, purpose, pic, span } => self
                .store
                .update(&store_id(id)?, BookingPatch::full(purpose, pic, *span))
                .await
                .map(Settled::Saved),
            Mutation::Reschedule { id, span } => self
                .store
                .update(&store_id(id)?, BookingPatch::reschedule(*span))
                .await
                .map(Settled::Saved),
            Mutation::Delete { id } => self
                .store
                .delete(&store_id(id)?)
                .await
                .map(|()| Settled::Deleted),
        }
    }

    /// Send a staged mutation to the store, settle it, then refresh if configured.
    ///
    /// The refresh is skipped while other mutations are unsettled: it would
    /// replace their optimistic entries with the store's older records.
    async fn commit(&self, pending: PendingMutation) -> Result<Option<Reservation>, ReconcileError> {
        let result = self.dispatch(&pending.mutation).await;
        let outcome = self.reconcile(pending, result).await?;
        if !self.config.refresh_after_settle {
            return Ok(outcome);
        }
        let others = self.in_flight();
        if others > 0 {
            debug!("refresh after settle skipped, {others} mutations in flight");
        } else if let Err(e) = self.refresh().await {
            warn!("refresh after settle failed: {e}");
        }
        Ok(outcome)
    }

    /// Look up a shown, persisted reservation for editing.
    fn editable<'a>(ledger: &'a Ledger, id: &ReservationId) -> Result<&'a Reservation, ReconcileError> {
        let entry = ledger
            .get(id)
            .filter(|e| e.is_visible())
            .ok_or_else(|| ReconcileError::NotFound(id.clone()))?;
        if id.is_placeholder() {
            return Err(ReconcileError::NotPersisted(id.clone()));
        }
        Ok(&entry.reservation)
    }

    pub async fn create(&self, draft: &Draft) -> Result<Reservation, ReconcileError> {
        let id = ReservationId::placeholder();
        let claim = self.claim(&id)?;
        let pending = {
            let mut ledger = self.ledger.write().await;
            let c = validate(draft, ledger.occupying(), None, &self.config.window)?;
            let mutation = Mutation::Create(Reservation {
                id: id.clone(),
                purpose: c.purpose,
                pic: c.pic,
                span: c.span,
            });
            self.stage(&mut ledger, mutation, claim)?
        };
        self.commit(pending)
            .await?
            .ok_or(ReconcileError::NotFound(id))
    }

    pub async fn update(
        &self,
        id: &ReservationId,
        draft: &Draft,
    ) -> Result<Reservation, ReconcileError> {
        let claim = self.claim(id)?;
        let pending = {
            let mut ledger = self.ledger.write().await;
            Self::editable(&ledger, id)?;
            let c = validate(draft, ledger.occupying(), Some(id), &self.config.window)?;
            let mutation = Mutation::Edit {
                id: id.clone(),
                purpose: c.purpose,
                pic: c.pic,
                span: c.span,
            };
            self.stage(&mut ledger, mutation, claim)?
        };
        self.commit(pending)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(id.clone()))
    }

    /// Form submit: create for a fresh draft, update when it is editing.
    pub async fn submit(&self, draft: &Draft) -> Result<Reservation, ReconcileError> {
        match &draft.editing {
            None => self.create(draft).await,
            Some(id) => self.update(id, draft).await,
        }
    }

    /// Move or stretch a reservation to new times, keeping its labels.
    ///
    /// With `strict_gestures` the new times are validated like an edit;
    /// otherwise only `start < end` is enforced.
    pub async fn reschedule(
        &self,
        id: &ReservationId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Reservation, ReconcileError> {
        let claim = self.claim(id)?;
        let pending = {
            let mut ledger = self.ledger.write().await;
            let current = Self::editable(&ledger, id)?;
            let span = if self.config.strict_gestures {
                let draft = Draft {
                    start: Some(start),
                    end: Some(end),
                    ..Draft::editing(current)
                };
                validate(&draft, ledger.occupying(), Some(id), &self.config.window)?.span
            } else {
                validate_interval(start, end)?
            };
            let mutation = Mutation::Reschedule {
                id: id.clone(),
                span,
            };
            self.stage(&mut ledger, mutation, claim)?
        };
        self.commit(pending)
            .await?
            .ok_or_else(|| ReconcileError::NotFound(id.clone()))
    }

    pub async fn on_event_drop(
        &self,
        id: &ReservationId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Reservation, ReconcileError> {
        self.reschedule(id, start, end).await
    }

    pub async fn on_event_resize(
        &self,
        id: &ReservationId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Reservation, ReconcileError> {
        self.reschedule(id, start, end).await
    }

    /// Hide the reservation now; drop it once the store confirms, restore it if not.
    pub async fn delete(&self, id: &ReservationId) -> Result<(), ReconcileError> {
        let claim = self.claim(id)?;
        let pending = {
            let mut ledger = self.ledger.write().await;
            Self::editable(&ledger, id)?;
            self.stage(&mut ledger, Mutation::Delete { id: id.clone() }, claim)?
        };
        self.commit(pending).await.map(|_| ())
    }
}
