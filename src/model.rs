use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds UTC, the only instant type at rest.
pub type Ms = i64;

/// A window of UTC milliseconds. Half-open: `start` is inside, `end` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "span must end after its start");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Strict intersection test. Windows that merely touch are not a clash.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// How a series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    /// Every weekday. Saturday and Sunday dates are skipped.
    Daily,
    Weekly,
    Monthly,
}

/// Recurrence rule carried by the base booking of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    /// Last civil date eligible for an occurrence (inclusive).
    pub until: NaiveDate,
}

/// One scheduled meeting: a standalone booking, a series base, or a
/// generated child occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub span: Span,
    pub room_id: Ulid,
    pub organizer_id: Ulid,
    /// Sorted, deduplicated participant ids.
    pub participants: Vec<Ulid>,
    /// Base booking of the series this child belongs to.
    pub parent_id: Option<Ulid>,
    /// Present only on a series base; children never carry a rule.
    pub recurrence: Option<RecurrenceRule>,
    pub created_at: Ms,
}

impl Booking {
    /// Exact identity membership: organizer or participant.
    pub fn involves(&self, user: Ulid) -> bool {
        self.organizer_id == user || self.participants.contains(&user)
    }
}

/// A bookable room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
}

/// Directory entry participant refs resolve against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: Ulid,
    pub name: String,
    pub email: String,
}

/// A room's reservation entry: booking id + its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: Ulid,
    pub span: Span,
}

/// Live per-room state: metadata plus slots sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
    pub slots: Vec<Slot>,
}

impl RoomState {
    pub fn new(id: Ulid, name: String, active: bool) -> Self {
        Self {
            id,
            name,
            active,
            slots: Vec::new(),
        }
    }

    /// Insert keeping `slots` ordered by start time.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .partition_point(|s| s.span.start <= slot.span.start);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, id: Ulid) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        Some(self.slots.remove(pos))
    }

    /// Slots clashing with `query`, pruned on the right via the sort order.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        // Slots at or past `cut` start no earlier than query.end, so none of them can intersect.
        let cut = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..cut].iter().filter(move |s| s.span.end > query.start)
    }
}

/// Durable state changes. One log record per variant, nothing nested beyond the meeting itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        id: Ulid,
        name: String,
        active: bool,
    },
    RoomRetired {
        id: Ulid,
    },
    PersonAdded {
        id: Ulid,
        name: String,
        email: String,
    },
    MeetingScheduled {
        meeting: Booking,
    },
    /// Full replacement record; the meeting may have moved rooms.
    MeetingUpdated {
        meeting: Booking,
    },
    MeetingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Request / result types ───────────────────────────────────────

/// Submitted meeting fields, in civil wall-clock time of the engine's zone.
#[derive(Debug, Clone)]
pub struct MeetingDraft {
    pub title: String,
    pub description: Option<String>,
    pub room_id: Ulid,
    pub organizer_id: Ulid,
    pub participants: Vec<Ulid>,
    pub start: chrono::NaiveDateTime,
    pub end: chrono::NaiveDateTime,
    pub recurrence: Option<RecurrenceRule>,
}

/// One conflicting booking, with civil times for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictBrief {
    pub id: Ulid,
    pub title: String,
    pub start: chrono::NaiveDateTime,
    pub end: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAvailability {
    pub free: bool,
    pub conflicts: Vec<ConflictBrief>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAvailability {
    pub free: bool,
    /// Names of people with an overlapping booking.
    pub busy: Vec<String>,
}

/// Result of expanding a recurrence rule into children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expansion {
    pub created: Vec<Booking>,
    /// Occurrences dropped because their slot could not be taken.
    pub skipped: u32,
}

/// A committed base booking plus whatever its rule expanded into.
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub meeting: Booking,
    pub expansion: Expansion,
}

/// Feed entry with RFC 3339 local timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub id: Ulid,
    pub title: String,
    pub room: String,
    pub start: String,
    pub end: String,
}
