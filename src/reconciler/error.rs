use crate::model::{Field, Reservation, ReservationId};
use crate::store::StoreError;

pub const MSG_REQUIRED: &str = "This field is required";
pub const MSG_START_BEFORE_END: &str = "Start time must be before end time";
pub const MSG_END_AFTER_START: &str = "End time must be after start time";
pub const MSG_CONFLICT: &str = "Selected time conflicts with another booking";
pub const MSG_OUT_OF_WINDOW: &str = "Selected time is outside the bookable range";

/// Local rejection of a draft. Never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    IncompleteInput(Vec<Field>),
    InvertedInterval,
    /// A label over the length limit, with the field it belongs to.
    LimitExceeded(Field, &'static str),
    OutOfWindow,
    /// Carries the first overlapping reservation; user-facing text does not name it.
    SchedulingConflict(Reservation),
}

impl ValidationError {
    /// Inline messages, per form field.
    pub fn field_errors(&self) -> Vec<(Field, &'static str)> {
        match self {
            ValidationError::IncompleteInput(fields) => {
                fields.iter().map(|f| (*f, MSG_REQUIRED)).collect()
            }
            ValidationError::InvertedInterval => vec![
                (Field::Start, MSG_START_BEFORE_END),
                (Field::End, MSG_END_AFTER_START),
            ],
            ValidationError::SchedulingConflict(_) => {
                vec![(Field::Start, MSG_CONFLICT), (Field::End, MSG_CONFLICT)]
            }
            ValidationError::OutOfWindow => {
                vec![(Field::Start, MSG_OUT_OF_WINDOW), (Field::End, MSG_OUT_OF_WINDOW)]
            }
            ValidationError::LimitExceeded(field, msg) => vec![(*field, *msg)],
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::IncompleteInput(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
                write!(f, "missing required fields: {}", names.join(", "))
            }
            ValidationError::InvertedInterval => write!(f, "end time must be after start time"),
            ValidationError::LimitExceeded(_, msg) => write!(f, "limit exceeded: {msg}"),
            ValidationError::OutOfWindow => write!(f, "outside the bookable range"),
            ValidationError::SchedulingConflict(_) => {
                write!(f, "selected time conflicts with another booking")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    Validation(ValidationError),
    /// The store refused a mutation; local state was rolled back.
    RemoteMutation(StoreError),
    /// Listing the store failed; local state is unchanged.
    RemoteFetch(StoreError),
    NotFound(ReservationId),
    /// Another mutation for this reservation has not settled yet.
    MutationInFlight(ReservationId),
    /// The reservation has no store identity yet.
    NotPersisted(ReservationId),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Validation(e) => write!(f, "invalid booking: {e}"),
            ReconcileError::RemoteMutation(e) => write!(f, "failed to save booking: {e}"),
            ReconcileError::RemoteFetch(e) => write!(f, "failed to fetch bookings: {e}"),
            ReconcileError::NotFound(id) => write!(f, "booking not found: {id}"),
            ReconcileError::MutationInFlight(id) => {
                write!(f, "booking {id} has a change in progress")
            }
            ReconcileError::NotPersisted(id) => write!(f, "booking {id} is not saved yet"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Validation(e) => Some(e),
            ReconcileError::RemoteMutation(e) | ReconcileError::RemoteFetch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for ReconcileError {
    fn from(e: ValidationError) -> Self {
        ReconcileError::Validation(e)
    }
}
