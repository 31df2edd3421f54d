use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Local wall-clock time, the only time type in the crate.
pub type Timestamp = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a span only if `start < end`.
    pub fn checked(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn contains_instant(&self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }
}

/// Identity of a reservation: store-assigned once persisted, a ulid placeholder before.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReservationId {
    Placeholder(Ulid),
    Stored(String),
}

const PLACEHOLDER_PREFIX: &str = "tmp-";

impl ReservationId {
    pub fn placeholder() -> Self {
        ReservationId::Placeholder(Ulid::new())
    }

    pub fn from_store(id: impl Into<String>) -> Self {
        ReservationId::Stored(id.into())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ReservationId::Placeholder(_))
    }

    pub fn as_store_id(&self) -> Option<&str> {
        match self {
            ReservationId::Stored(id) => Some(id),
            ReservationId::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationId::Placeholder(ulid) => write!(f, "{PLACEHOLDER_PREFIX}{ulid}"),
            ReservationId::Stored(id) => f.write_str(id),
        }
    }
}

impl FromStr for ReservationId {
    type Err = std::convert::Infallible;

    /// Widget ids come back as strings; `tmp-<ulid>` maps back to a placeholder.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(PLACEHOLDER_PREFIX)
            && let Ok(ulid) = Ulid::from_string(rest)
        {
            return Ok(ReservationId::Placeholder(ulid));
        }
        Ok(ReservationId::Stored(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub purpose: String,
    /// Person in charge.
    pub pic: String,
    pub span: Span,
}

impl Reservation {
    pub fn start(&self) -> Timestamp {
        self.span.start
    }

    pub fn end(&self) -> Timestamp {
        self.span.end
    }

    /// Calendar title: `purpose (pic)`.
    pub fn title(&self) -> String {
        format!("{} ({})", self.purpose, self.pic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Confirmed,
    PendingCreate,
    PendingUpdate,
    /// Hidden from the calendar but still occupies its slot until the store confirms.
    PendingDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub reservation: Reservation,
    pub status: SyncStatus,
}

impl Entry {
    pub fn confirmed(reservation: Reservation) -> Self {
        Self {
            reservation,
            status: SyncStatus::Confirmed,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.status != SyncStatus::PendingDelete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Purpose,
    Pic,
    Start,
    End,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Purpose => "purpose",
            Field::Pic => "pic",
            Field::Start => "start",
            Field::End => "end",
        }
    }
}

/// Form or gesture input that has not been validated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// Set when editing an existing reservation.
    pub editing: Option<ReservationId>,
    pub purpose: Option<String>,
    pub pic: Option<String>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl Draft {
    pub fn new(purpose: &str, pic: &str, start: Timestamp, end: Timestamp) -> Self {
        Self {
            editing: None,
            purpose: Some(purpose.to_string()),
            pic: Some(pic.to_string()),
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn for_slot(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn editing(reservation: &Reservation) -> Self {
        Self {
            editing: Some(reservation.id.clone()),
            purpose: Some(reservation.purpose.clone()),
            pic: Some(reservation.pic.clone()),
            start: Some(reservation.span.start),
            end: Some(reservation.span.end),
        }
    }
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub purpose: String,
    pub pic: String,
    pub span: Span,
}

// ── Timestamps at the edge ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampError {
    pub raw: String,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized timestamp: {:?}", self.raw)
    }
}

impl std::error::Error for TimestampError {}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp string into local wall-clock time.
/// Offset-bearing RFC 3339 values are shifted into the local zone; naive values are taken as-is.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Local).naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| TimestampError {
            raw: raw.to_string(),
        })
}

pub fn format_timestamp(ts: Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
pub(crate) fn at(raw: &str) -> Timestamp {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap()
}
