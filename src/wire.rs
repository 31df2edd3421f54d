use std::io;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::limits::MAX_LINE_LEN;
use crate::observability;
use crate::store::{BookingPatch, BookingPayload, BookingStore, RemoteBooking, StoreError};

/// One request per line, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    List,
    Create { booking: BookingPayload },
    Update { id: String, patch: BookingPatch },
    Delete { id: String },
}

impl Request {
    pub fn label(&self) -> &'static str {
        match self {
            Request::List => "list",
            Request::Create { .. } => "create",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Conflict,
    Rejected,
    BadRequest,
    Internal,
}

/// One response per request line, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Bookings { bookings: Vec<RemoteBooking> },
    Booking { booking: RemoteBooking },
    Deleted,
    Error { code: ErrorCode, message: String },
}

impl Response {
    fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            Response::Error { .. } => "error",
            _ => "ok",
        }
    }
}

/// Map a store failure onto the wire.
pub fn store_err(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(id) => Response::error(ErrorCode::NotFound, id),
        StoreError::Conflict(id) => Response::error(ErrorCode::Conflict, id),
        StoreError::Rejected(msg) => Response::error(ErrorCode::Rejected, msg),
        other => Response::error(ErrorCode::Internal, other.to_string()),
    }
}

/// Map a wire error back to the store failure it came from.
pub fn wire_err(code: ErrorCode, message: String) -> StoreError {
    match code {
        ErrorCode::NotFound => StoreError::NotFound(message),
        ErrorCode::Conflict => StoreError::Conflict(message),
        ErrorCode::Rejected | ErrorCode::BadRequest => StoreError::Rejected(message),
        ErrorCode::Internal => StoreError::Transport(message),
    }
}

pub fn codec_err(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line too long")
        }
    }
}

pub fn lines_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_LINE_LEN)
}

pub async fn execute_request<S: BookingStore + ?Sized>(store: &S, req: Request) -> Response {
    match req {
        Request::List => match store.list().await {
            Ok(bookings) => Response::Bookings { bookings },
            Err(e) => store_err(e),
        },
        Request::Create { booking } => match store.create(booking).await {
            Ok(booking) => Response::Booking { booking },
            Err(e) => store_err(e),
        },
        Request::Update { id, patch } => match store.update(&id, patch).await {
            Ok(booking) => Response::Booking { booking },
            Err(e) => store_err(e),
        },
        Request::Delete { id } => match store.delete(&id).await {
            Ok(()) => Response::Deleted,
            Err(e) => store_err(e),
        },
    }
}

/// Serve one client until it disconnects. Malformed lines get a `bad_request`
/// response; the connection stays open.
pub async fn process_connection<T, S>(socket: T, store: Arc<S>) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: BookingStore + ?Sized,
{
    let mut framed = Framed::new(socket, lines_codec());
    while let Some(line) = framed.next().await {
        let line = line.map_err(codec_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let started = std::time::Instant::now();
        let (op, response) = match serde_json::from_str::<Request>(&line) {
            Ok(req) => {
                let op = req.label();
                debug!("request {op}");
                (op, execute_request(store.as_ref(), req).await)
            }
            Err(e) => ("invalid", Response::error(ErrorCode::BadRequest, e.to_string())),
        };
        metrics::counter!(
            observability::REQUESTS_TOTAL,
            "op" => op,
            "status" => response.status_label()
        )
        .increment(1);
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());

        let out = serde_json::to_string(&response)?;
        framed.send(out).await.map_err(codec_err)?;
    }
    Ok(())
}
