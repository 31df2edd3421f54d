use std::io;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

use crate::conflict::check_conflict;
use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use super::{BookingPatch, BookingPayload, BookingStore, RemoteBooking, StoreError};

/// Journal record format. Flat, one per accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Created {
        id: String,
        purpose: String,
        pic: String,
        span: Span,
    },
    Updated {
        id: String,
        purpose: String,
        pic: String,
        span: Span,
    },
    Deleted {
        id: String,
    },
}

// ── Group-commit journal channel ─────────────────────────

enum JournalCommand {
    Append {
        event: JournalEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<JournalEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Ack = oneshot::Sender<io::Result<()>>;

/// Owns the journal file. Appends that queue up while one batch is being
/// written are flushed together with a single fsync.
async fn journal_writer_loop(mut wal: Wal<JournalEvent>, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            JournalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, ack) in batch {
            let _ = ack.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal<JournalEvent>, batch: &[(JournalEvent, Ack)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal<JournalEvent>, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

struct StoreState {
    records: Vec<Reservation>,
    next_id: u64,
}

impl StoreState {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.id.as_store_id() == Some(id))
    }

    fn apply(&mut self, event: &JournalEvent) {
        match event {
            JournalEvent::Created { id, purpose, pic, span } => {
                if let Ok(n) = id.parse::<u64>() {
                    self.next_id = self.next_id.max(n + 1);
                }
                self.records.push(Reservation {
                    id: ReservationId::from_store(id.clone()),
                    purpose: purpose.clone(),
                    pic: pic.clone(),
                    span: *span,
                });
            }
            JournalEvent::Updated { id, purpose, pic, span } => {
                if let Some(pos) = self.position(id) {
                    let r = &mut self.records[pos];
                    r.purpose = purpose.clone();
                    r.pic = pic.clone();
                    r.span = *span;
                }
            }
            JournalEvent::Deleted { id } => {
                if let Some(pos) = self.position(id) {
                    self.records.remove(pos);
                }
            }
        }
    }

    fn snapshot_events(&self) -> Vec<JournalEvent> {
        self.records
            .iter()
            .map(|r| JournalEvent::Created {
                id: r.id.to_string(),
                purpose: r.purpose.clone(),
                pic: r.pic.clone(),
                span: r.span,
            })
            .collect()
    }
}

fn to_remote(r: &Reservation) -> RemoteBooking {
    RemoteBooking {
        id: r.id.to_string(),
        purpose: r.purpose.clone(),
        pic: Some(r.pic.clone()),
        start_time: format_timestamp(r.span.start),
        end_time: format_timestamp(r.span.end),
    }
}

fn check_label(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Rejected(format!("{field} is required")));
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(StoreError::Rejected(format!("{field} too long")));
    }
    Ok(())
}

fn parse_span(start: &str, end: &str) -> Result<Span, StoreError> {
    let start = parse_timestamp(start).map_err(|e| StoreError::Rejected(e.to_string()))?;
    let end = parse_timestamp(end).map_err(|e| StoreError::Rejected(e.to_string()))?;
    Span::checked(start, end).ok_or_else(|| StoreError::Rejected("end must be after start".into()))
}

/// Authoritative in-process booking store.
///
/// Re-checks every mutation for overlaps, so a client whose local view was
/// stale still cannot double-book the room. With a journal, every accepted
/// mutation is durable before it is acknowledged.
pub struct LocalStore {
    state: RwLock<StoreState>,
    journal_tx: Option<mpsc::Sender<JournalCommand>>,
}

impl LocalStore {
    /// Memory-only store; contents vanish on drop.
    pub fn ephemeral() -> Self {
        Self {
            state: RwLock::new(StoreState::empty()),
            journal_tx: None,
        }
    }

    /// Replay the journal at `path`, drop any torn tail, and spawn its writer.
    /// Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::<JournalEvent>::recover(path)?;
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(wal, rx));

        let mut state = StoreState::empty();
        for event in &events {
            state.apply(event);
        }
        info!(
            "journal {} replayed: {} events, {} bookings",
            path.display(),
            events.len(),
            state.records.len()
        );

        Ok(Self {
            state: RwLock::new(state),
            journal_tx: Some(tx),
        })
    }

    async fn journal_append(&self, event: &JournalEvent) -> Result<(), StoreError> {
        let Some(tx) = &self.journal_tx else {
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(JournalCommand::Append {
            event: event.clone(),
            response,
        })
        .await
        .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    /// Journal then apply, under the caller's write lock.
    async fn persist_and_apply(
        &self,
        state: &mut StoreState,
        event: JournalEvent,
    ) -> Result<(), StoreError> {
        self.journal_append(&event).await?;
        state.apply(&event);
        Ok(())
    }

    /// Appends since the last compaction; zero for an ephemeral store.
    pub async fn appends_since_compact(&self) -> u64 {
        let Some(tx) = &self.journal_tx else {
            return 0;
        };
        let (response, rx) = oneshot::channel();
        if tx.send(JournalCommand::AppendsSinceCompact { response }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the journal as one `Created` per live booking.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(tx) = &self.journal_tx else {
            return Ok(());
        };
        // Write lock held throughout: no append may land between snapshot and swap.
        let state = self.state.write().await;
        let events = state.snapshot_events();
        let (response, rx) = oneshot::channel();
        tx.send(JournalCommand::Compact { events, response })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))?;
        debug!("journal compacted to {} bookings", state.records.len());
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current bookings, in creation order.
    pub async fn reservations(&self) -> Vec<Reservation> {
        self.state.read().await.records.clone()
    }
}

#[async_trait]
impl BookingStore for LocalStore {
    async fn list(&self) -> Result<Vec<RemoteBooking>, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.iter().map(to_remote).collect())
    }

    async fn create(&self, payload: BookingPayload) -> Result<RemoteBooking, StoreError> {
        check_label("purpose", &payload.purpose)?;
        check_label("pic", &payload.pic)?;
        let span = parse_span(&payload.start_time, &payload.end_time)?;

        let mut state = self.state.write().await;
        if state.records.len() >= MAX_RESERVATIONS {
            return Err(StoreError::Rejected("too many bookings".into()));
        }
        if let Some(hit) = check_conflict(&span, &state.records, None) {
            return Err(StoreError::Conflict(hit.id.to_string()));
        }

        let id = state.next_id.to_string();
        let event = JournalEvent::Created {
            id: id.clone(),
            purpose: payload.purpose,
            pic: payload.pic,
            span,
        };
        self.persist_and_apply(&mut state, event).await?;
        let pos = state.position(&id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        debug!("created booking {id}");
        Ok(to_remote(&state.records[pos]))
    }

    async fn update(&self, id: &str, patch: BookingPatch) -> Result<RemoteBooking, StoreError> {
        let mut state = self.state.write().await;
        let pos = state
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let current = state.records[pos].clone();

        let purpose = patch.purpose.unwrap_or(current.purpose);
        let pic = patch.pic.unwrap_or(current.pic);
        check_label("purpose", &purpose)?;
        check_label("pic", &pic)?;
        let start = patch
            .start_time
            .unwrap_or_else(|| format_timestamp(current.span.start));
        let end = patch
            .end_time
            .unwrap_or_else(|| format_timestamp(current.span.end));
        let span = parse_span(&start, &end)?;

        if let Some(hit) = check_conflict(&span, &state.records, Some(&current.id)) {
            return Err(StoreError::Conflict(hit.id.to_string()));
        }

        let event = JournalEvent::Updated {
            id: id.to_string(),
            purpose,
            pic,
            span,
        };
        self.persist_and_apply(&mut state, event).await?;
        debug!("updated booking {id}");
        Ok(to_remote(&state.records[pos]))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.position(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist_and_apply(&mut state, JournalEvent::Deleted { id: id.to_string() })
            .await?;
        debug!("deleted booking {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_journal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomcal_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn payload(purpose: &str, start: &str, end: &str) -> BookingPayload {
        BookingPayload {
            purpose: purpose.into(),
            pic: "Budi".into(),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = LocalStore::ephemeral();
        let a = store
            .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await
            .unwrap();
        let b = store
            .create(payload("B", "2025-03-03T10:00", "2025-03-03T11:00"))
            .await
            .unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
        assert_eq!(a.start_time, "2025-03-03T09:00:00.000");
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_overlap() {
        let store = LocalStore::ephemeral();
        store
            .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await
            .unwrap();
        let err = store
            .create(payload("B", "2025-03-03T09:30", "2025-03-03T10:30"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("1".into()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_bad_payloads() {
        let store = LocalStore::ephemeral();
        let blank = store
            .create(payload("  ", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await;
        assert!(matches!(blank, Err(StoreError::Rejected(_))));

        let inverted = store
            .create(payload("A", "2025-03-03T10:00", "2025-03-03T10:00"))
            .await;
        assert!(matches!(inverted, Err(StoreError::Rejected(_))));

        let garbled = store.create(payload("A", "noon", "2025-03-03T10:00")).await;
        assert!(matches!(garbled, Err(StoreError::Rejected(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn update_merges_patch_and_skips_self() {
        let store = LocalStore::ephemeral();
        let a = store
            .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await
            .unwrap();
        let moved = store
            .update(
                &a.id,
                BookingPatch {
                    start_time: Some("2025-03-03T09:30".into()),
                    end_time: Some("2025-03-03T10:30".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.purpose, "A");
        assert_eq!(moved.start_time, "2025-03-03T09:30:00.000");
        assert_eq!(moved.end_time, "2025-03-03T10:30:00.000");
    }

    #[tokio::test]
    async fn update_rejects_overlap_with_other() {
        let store = LocalStore::ephemeral();
        store
            .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await
            .unwrap();
        let b = store
            .create(payload("B", "2025-03-03T11:00", "2025-03-03T12:00"))
            .await
            .unwrap();
        let err = store
            .update(
                &b.id,
                BookingPatch {
                    start_time: Some("2025-03-03T09:45".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("1".into()));
    }

    #[tokio::test]
    async fn update_and_delete_unknown_id() {
        let store = LocalStore::ephemeral();
        let err = store.update("9", BookingPatch::default()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("9".into()));
        let err = store.delete("9").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("9".into()));
    }

    #[tokio::test]
    async fn journal_replay_restores_state_and_ids() {
        let path = test_journal_path("replay.wal");
        {
            let store = LocalStore::open(&path).unwrap();
            let a = store
                .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
                .await
                .unwrap();
            store
                .create(payload("B", "2025-03-03T10:00", "2025-03-03T11:00"))
                .await
                .unwrap();
            store
                .update(
                    &a.id,
                    BookingPatch {
                        purpose: Some("A2".into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            store.delete("2").await.unwrap();
        }

        let store = LocalStore::open(&path).unwrap();
        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "1");
        assert_eq!(list[0].purpose, "A2");

        // Ids are never reused after replay.
        let c = store
            .create(payload("C", "2025-03-03T12:00", "2025-03-03T13:00"))
            .await
            .unwrap();
        assert_eq!(c.id, "3");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn bookings_after_a_torn_tail_survive_restart() {
        let path = test_journal_path("torn_then_append.wal");
        {
            let store = LocalStore::open(&path).unwrap();
            store
                .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
                .await
                .unwrap();
        }
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40u8, 0, 0, 0, 7, 7, 7]).unwrap();
        }
        {
            let store = LocalStore::open(&path).unwrap();
            let b = store
                .create(payload("B", "2025-03-03T10:00", "2025-03-03T11:00"))
                .await
                .unwrap();
            assert_eq!(b.id, "2");
        }

        let store = LocalStore::open(&path).unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn compaction_preserves_state() {
        let path = test_journal_path("compact.wal");
        {
            let store = LocalStore::open(&path).unwrap();
            for hour in 8..14 {
                let start = format!("2025-03-03T{hour:02}:00");
                let end = format!("2025-03-03T{hour:02}:30");
                store.create(payload("X", &start, &end)).await.unwrap();
            }
            for id in ["1", "2", "3"] {
                store.delete(id).await.unwrap();
            }
            assert_eq!(store.appends_since_compact().await, 9);
            store.compact().await.unwrap();
            assert_eq!(store.appends_since_compact().await, 0);
        }

        let replayed = Wal::<JournalEvent>::replay(&path).unwrap();
        assert_eq!(replayed.len(), 3);

        let store = LocalStore::open(&path).unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["4", "5", "6"]);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn ephemeral_store_has_no_journal() {
        let store = LocalStore::ephemeral();
        store
            .create(payload("A", "2025-03-03T09:00", "2025-03-03T10:00"))
            .await
            .unwrap();
        assert_eq!(store.appends_since_compact().await, 0);
        store.compact().await.unwrap();
    }
}
