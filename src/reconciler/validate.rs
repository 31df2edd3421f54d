use crate::config::BookingWindow;
use crate::conflict::check_conflict;
use crate::limits::MAX_LABEL_LEN;
use crate::model::*;

use super::ValidationError;

fn present(label: &Option<String>) -> Option<&str> {
    label.as_deref().filter(|s| !s.trim().is_empty())
}

/// `start < end`, strictly.
pub fn validate_interval(start: Timestamp, end: Timestamp) -> Result<Span, ValidationError> {
    Span::checked(start, end).ok_or(ValidationError::InvertedInterval)
}

/// Check a draft in order: required fields, interval direction, limits and window,
/// then overlap with `existing` (skipping `exclude`).
pub fn validate<'a>(
    draft: &Draft,
    existing: impl IntoIterator<Item = &'a Reservation>,
    exclude: Option<&ReservationId>,
    window: &BookingWindow,
) -> Result<Candidate, ValidationError> {
    let purpose = present(&draft.purpose);
    let pic = present(&draft.pic);
    let (Some(purpose), Some(pic), Some(start), Some(end)) = (purpose, pic, draft.start, draft.end)
    else {
        let missing = [
            (Field::Purpose, purpose.is_none()),
            (Field::Pic, pic.is_none()),
            (Field::Start, draft.start.is_none()),
            (Field::End, draft.end.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect();
        return Err(ValidationError::IncompleteInput(missing));
    };

    let span = validate_interval(start, end)?;

    if purpose.len() > MAX_LABEL_LEN {
        return Err(ValidationError::LimitExceeded(Field::Purpose, "purpose too long"));
    }
    if pic.len() > MAX_LABEL_LEN {
        return Err(ValidationError::LimitExceeded(Field::Pic, "pic too long"));
    }
    if !window.admits(&span) {
        return Err(ValidationError::OutOfWindow);
    }

    if let Some(hit) = check_conflict(&span, existing, exclude) {
        return Err(ValidationError::SchedulingConflict(hit.clone()));
    }

    Ok(Candidate {
        purpose: purpose.to_string(),
        pic: pic.to_string(),
        span,
    })
}
