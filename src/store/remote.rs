use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use crate::wire::{codec_err, lines_codec, wire_err, Request, Response};

use super::{BookingPatch, BookingPayload, BookingStore, RemoteBooking, StoreError};

type Connection = Framed<TcpStream, LinesCodec>;

/// `BookingStore` client for a store served over the line protocol.
///
/// Holds one connection, opened on first use. A transport failure drops the
/// connection so the next call dials again; the failed call is not retried.
pub struct RemoteStore {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

impl RemoteStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn round_trip(&self, req: &Request) -> Result<Response, StoreError> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let socket = TcpStream::connect(&self.addr).await?;
            debug!("connected to booking store at {}", self.addr);
            *guard = Some(Framed::new(socket, lines_codec()));
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Transport("no connection".into()));
        };

        let result = exchange(conn, req).await;
        if let Err(e) = &result {
            warn!("booking store {}: {e}; dropping connection", self.addr);
            *guard = None;
        }
        result
    }
}

async fn exchange(conn: &mut Connection, req: &Request) -> Result<Response, StoreError> {
    let line = serde_json::to_string(req).map_err(|e| StoreError::Decode(e.to_string()))?;
    conn.send(line).await.map_err(codec_err)?;
    let reply = conn
        .next()
        .await
        .ok_or_else(|| StoreError::Transport("connection closed".into()))?
        .map_err(codec_err)?;
    serde_json::from_str(&reply).map_err(|e| StoreError::Decode(e.to_string()))
}

fn unexpected(op: &str, resp: Response) -> StoreError {
    match resp {
        Response::Error { code, message } => wire_err(code, message),
        other => StoreError::Decode(format!("unexpected reply to {op}: {other:?}")),
    }
}

#[async_trait]
impl BookingStore for RemoteStore {
    async fn list(&self) -> Result<Vec<RemoteBooking>, StoreError> {
        match self.round_trip(&Request::List).await? {
            Response::Bookings { bookings } => Ok(bookings),
            other => Err(unexpected("list", other)),
        }
    }

    async fn create(&self, payload: BookingPayload) -> Result<RemoteBooking, StoreError> {
        match self.round_trip(&Request::Create { booking: payload }).await? {
            Response::Booking { booking } => Ok(booking),
            other => Err(unexpected("create", other)),
        }
    }

    async fn update(&self, id: &str, patch: BookingPatch) -> Result<RemoteBooking, StoreError> {
        let req = Request::Update {
            id: id.to_string(),
            patch,
        };
        match self.round_trip(&req).await? {
            Response::Booking { booking } => Ok(booking),
            other => Err(unexpected("update", other)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.round_trip(&Request::Delete { id: id.to_string() }).await? {
            Response::Deleted => Ok(()),
            other => Err(unexpected("delete", other)),
        }
    }
}
