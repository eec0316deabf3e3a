use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Event, Ms};

/// Slow feed readers start losing events past this backlog.
const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of committed events, one broadcast channel per room.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Open a live feed for one room, creating its channel on first use.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to the room's feed. Nothing happens without subscribers.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(tx) = self.channels.get(&room_id) {
            let _ = tx.send(event.clone());
        }
    }
}

// ── Inbox ────────────────────────────────────────────────────────────

/// What an inbox notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Scheduled,
    Updated,
    Cancelled,
}

/// A per-person message about a meeting they are invited to.
#[derive(Debug, Clone)]
pub struct Notice {
    pub id: Ulid,
    pub user_id: Ulid,
    pub kind: NoticeKind,
    pub meeting_id: Ulid,
    pub message: String,
    pub read: bool,
    pub created_at: Ms,
}

/// In-memory notification inboxes. Volatile: not replayed from the WAL.
#[derive(Default)]
pub struct Inbox {
    notices: DashMap<Ulid, Vec<Notice>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, user_id: Ulid, kind: NoticeKind, meeting_id: Ulid, message: String, now: Ms) {
        let notice = Notice {
            id: Ulid::new(),
            user_id,
            kind,
            meeting_id,
            message,
            read: false,
            created_at: now,
        };
        self.notices.entry(user_id).or_default().push(notice);
    }

    /// All notices for a person, newest first.
    pub fn for_user(&self, user_id: Ulid) -> Vec<Notice> {
        self.notices
            .get(&user_id)
            .map(|entry| entry.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unread_count(&self, user_id: Ulid) -> usize {
        self.notices
            .get(&user_id)
            .map(|entry| entry.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Mark everything read; returns how many notices flipped.
    pub fn mark_all_read(&self, user_id: Ulid) -> usize {
        let mut flipped = 0;
        if let Some(mut entry) = self.notices.get_mut(&user_id) {
            for notice in entry.iter_mut().filter(|n| !n.read) {
                notice.read = true;
                flipped += 1;
            }
        }
        flipped
    }
}
