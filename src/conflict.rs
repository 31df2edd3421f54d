use crate::model::*;

/// Find the first reservation whose span overlaps `candidate`, in iteration order.
///
/// Boundaries are half-open, so back-to-back reservations do not conflict.
/// `exclude` skips the reservation being edited in place. The caller guarantees
/// `candidate.start < candidate.end`.
pub fn check_conflict<'a, I>(
    candidate: &Span,
    existing: I,
    exclude: Option<&ReservationId>,
) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    existing
        .into_iter()
        .filter(|r| exclude != Some(&r.id))
        .find(|r| candidate.overlaps(&r.span))
}

/// Every pair of reservations that overlaps. Empty when the set is consistent.
pub fn overlapping_pairs(reservations: &[Reservation]) -> Vec<(&Reservation, &Reservation)> {
    let mut by_start: Vec<&Reservation> = reservations.iter().collect();
    by_start.sort_by_key(|r| r.span.start);
    let mut pairs = Vec::new();
    for (i, a) in by_start.iter().enumerate() {
        // Sorted by start: once b starts at or after a ends, nothing later can overlap a.
        for b in &by_start[i + 1..] {
            if b.span.start >= a.span.end {
                break;
            }
            pairs.push((*a, *b));
        }
    }
    pairs
}
