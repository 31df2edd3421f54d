mod error;
mod local;
mod remote;

pub use error::StoreError;
pub use local::{JournalEvent, LocalStore};
pub use remote::RemoteStore;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::model::*;

/// Persistence collaborator the reconciler talks to.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteBooking>, StoreError>;
    async fn create(&self, payload: BookingPayload) -> Result<RemoteBooking, StoreError>;
    async fn update(&self, id: &str, patch: BookingPatch) -> Result<RemoteBooking, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// A reservation as the store serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBooking {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub purpose: String,
    #[serde(default)]
    pub pic: Option<String>,
    pub start_time: String,
    pub end_time: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }
    Ok(match RawId::deserialize(d)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub purpose: String,
    pub pic: String,
    pub start_time: String,
    pub end_time: String,
}

impl BookingPayload {
    pub fn new(purpose: &str, pic: &str, span: Span) -> Self {
        Self {
            purpose: purpose.to_string(),
            pic: pic.to_string(),
            start_time: format_timestamp(span.start),
            end_time: format_timestamp(span.end),
        }
    }
}

/// Partial update; absent fields are left as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl BookingPatch {
    /// Times only, as sent by drag and resize.
    pub fn reschedule(span: Span) -> Self {
        Self {
            start_time: Some(format_timestamp(span.start)),
            end_time: Some(format_timestamp(span.end)),
            ..Default::default()
        }
    }

    /// Every field, as sent by the edit form.
    pub fn full(purpose: &str, pic: &str, span: Span) -> Self {
        Self {
            purpose: Some(purpose.to_string()),
            pic: Some(pic.to_string()),
            ..Self::reschedule(span)
        }
    }
}

/// Why a remote record could not be turned into a `Reservation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Timestamp { id: String, source: TimestampError },
    InvertedInterval { id: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Timestamp { id, source } => write!(f, "record {id}: {source}"),
            DecodeError::InvertedInterval { id } => {
                write!(f, "record {id}: end is not after start")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl Reservation {
    /// Translate a store record, parsing its serialized timestamps.
    pub fn from_remote(remote: &RemoteBooking) -> Result<Self, DecodeError> {
        let parse = |raw: &str| {
            parse_timestamp(raw).map_err(|source| DecodeError::Timestamp {
                id: remote.id.clone(),
                source,
            })
        };
        let start = parse(&remote.start_time)?;
        let end = parse(&remote.end_time)?;
        let span = Span::checked(start, end).ok_or_else(|| DecodeError::InvertedInterval {
            id: remote.id.clone(),
        })?;
        Ok(Self {
            id: ReservationId::from_store(remote.id.clone()),
            purpose: remote.purpose.clone(),
            pic: remote.pic.clone().unwrap_or_default(),
            span,
        })
    }
}
