mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod recurrence;
mod store;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{Inbox, NotifyHub};
use crate::time::Clock;
use crate::wal::Wal;

use store::BookingStore;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Log writer task ──────────────────────────────────────

pub(super) enum WriterOp {
    Commit(Event, oneshot::Sender<io::Result<()>>),
    Rewrite(Vec<Event>, oneshot::Sender<io::Result<()>>),
    Backlog(oneshot::Sender<u64>),
}

/// Background task owning the log. Commits group: the first one blocks,
/// every commit already queued behind it joins the batch, and one fsync
/// covers the lot before any caller hears back. Rewrite and backlog ops
/// wait for the open batch to settle first.
async fn run_log_writer(mut wal: Wal, mut ops: mpsc::Receiver<WriterOp>) {
    while let Some(op) = ops.recv().await {
        let WriterOp::Commit(event, done) = op else {
            service_control(&mut wal, op);
            continue;
        };

        let mut batch = vec![(event, done)];
        let mut held_back = None;
        while let Ok(next) = ops.try_recv() {
            match next {
                WriterOp::Commit(event, done) => batch.push((event, done)),
                control => {
                    held_back = Some(control);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(control) = held_back {
            service_control(&mut wal, control);
        }
    }
}

/// Write the whole batch behind one fsync and answer every caller.
fn commit_batch(wal: &mut Wal, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut failed: Option<io::Error> = None;
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            failed = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes cannot
    // bleed into the next batch; its callers were already told no.
    let flushed = wal.flush_sync();
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let result = match (failed, flushed) {
        (Some(e), _) => Err(e),
        (None, r) => r,
    };
    for (_, tx) in batch {
        let _ = tx.send(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        });
    }
}

fn service_control(wal: &mut Wal, op: WriterOp) {
    match op {
        WriterOp::Rewrite(live, done) => {
            let result =
                Wal::write_compact_file(wal.path(), &live).and_then(|()| wal.swap_compact_file());
            let _ = done.send(result);
        }
        WriterOp::Backlog(done) => {
            let _ = done.send(wal.appends_since_compact());
        }
        WriterOp::Commit(..) => unreachable!("commits are batched by the writer loop"),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    store: BookingStore,
    writer: mpsc::Sender<WriterOp>,
    pub notify: Arc<NotifyHub>,
    pub inbox: Inbox,
    zone: Tz,
    clock: Arc<dyn Clock>,
}

/// Apply a committed event to a room timeline and the shared indexes.
/// Caller holds the room write lock.
fn apply_to_room(rs: &mut RoomState, store: &BookingStore, event: &Event) {
    match event {
        Event::MeetingScheduled { meeting } => {
            rs.insert_slot(Slot {
                id: meeting.id,
                span: meeting.span,
            });
            store.insert_meeting(meeting.clone());
        }
        Event::MeetingUpdated { meeting } => {
            rs.remove_slot(meeting.id);
            rs.insert_slot(Slot {
                id: meeting.id,
                span: meeting.span,
            });
            store.replace_meeting(meeting.clone());
        }
        Event::MeetingCancelled { id, .. } => {
            rs.remove_slot(*id);
            store.remove_meeting(id);
        }
        Event::RoomRetired { .. } => {
            rs.active = false;
        }
        // RoomAdded/PersonAdded are handled at the map level, not here
        Event::RoomAdded { .. } | Event::PersonAdded { .. } => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        zone: Tz,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let history = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (writer, ops) = mpsc::channel(4096);
        tokio::spawn(run_log_writer(wal, ops));

        let engine = Self {
            store: BookingStore::new(),
            writer,
            notify,
            inbox: Inbox::new(),
            zone,
            clock,
        };

        // Rebuilding single-threaded: no other task holds these Arcs yet,
        // so try_write cannot fail. blocking_write would panic under the
        // runtime this constructor may be called from.
        for event in &history {
            match event {
                Event::RoomAdded { id, name, active } => {
                    engine
                        .store
                        .insert_room(RoomState::new(*id, name.clone(), *active));
                }
                Event::RoomRetired { id } => {
                    if let Some(rs) = engine.store.get_room(id) {
                        rs.try_write().expect("rebuild holds the only reference").active = false;
                    }
                }
                Event::PersonAdded { id, name, email } => {
                    engine.store.insert_person(Person {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                    });
                }
                Event::MeetingUpdated { meeting } => {
                    // The meeting may have moved rooms; clear the old slot first
                    if let Some(old_room) = engine.store.room_for_booking(&meeting.id)
                        && old_room != meeting.room_id
                        && let Some(rs) = engine.store.get_room(&old_room)
                    {
                        rs.try_write()
                            .expect("rebuild holds the only reference")
                            .remove_slot(meeting.id);
                    }
                    if let Some(rs) = engine.store.get_room(&meeting.room_id) {
                        let mut guard = rs.try_write().expect("rebuild holds the only reference");
                        apply_to_room(&mut guard, &engine.store, event);
                    }
                }
                Event::MeetingScheduled { meeting } => {
                    if let Some(rs) = engine.store.get_room(&meeting.room_id) {
                        let mut guard = rs.try_write().expect("rebuild holds the only reference");
                        apply_to_room(&mut guard, &engine.store, event);
                    }
                }
                Event::MeetingCancelled { room_id, .. } => {
                    if let Some(rs) = engine.store.get_room(room_id) {
                        let mut guard = rs.try_write().expect("rebuild holds the only reference");
                        apply_to_room(&mut guard, &engine.store, event);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Queue one event for the writer task and wait out its fsync.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (done, wait) = oneshot::channel();
        self.writer
            .send(WriterOp::Commit(event.clone(), done))
            .await
            .map_err(|_| EngineError::WalError("log writer is gone".into()))?;
        match wait.await {
            Ok(written) => written.map_err(|e| EngineError::WalError(e.to_string())),
            Err(_) => Err(EngineError::WalError("log writer dropped the reply".into())),
        }
    }

    /// Commit one event to the log, then apply and announce it.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, &self.store, event);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// Acquire the write lock for a room's timeline.
    pub(super) async fn room_write(
        &self,
        room_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self
            .store
            .get_room(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        Ok(rs.write_owned().await)
    }

    /// Look up a meeting record by id.
    pub(super) fn meeting(&self, id: &Ulid) -> Result<Booking, EngineError> {
        self.store
            .get_meeting(id)
            .ok_or(EngineError::MeetingNotFound(*id))
    }

    pub fn get_meeting(&self, id: &Ulid) -> Option<Booking> {
        self.store.get_meeting(id)
    }

    pub fn meeting_count(&self) -> usize {
        self.store.meeting_count()
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }
}
