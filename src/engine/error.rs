use ulid::Ulid;

use crate::model::ConflictBrief;

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(Ulid),
    PersonNotFound(Ulid),
    MeetingNotFound(Ulid),
    /// Series operation aimed at a booking that is neither a base nor a child.
    NotASeries(Ulid),
    AlreadyExists(Ulid),
    RoomInactive(Ulid),
    EndNotAfterStart,
    StartInPast,
    CrossesDayBoundary,
    /// The requested wall-clock time does not exist in the engine zone.
    InvalidLocalTime,
    InvalidRecurrenceEnd,
    RoomConflict {
        room: String,
        conflicts: Vec<ConflictBrief>,
    },
    ParticipantConflict {
        busy: Vec<String>,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::PersonNotFound(id) => write!(f, "person not found: {id}"),
            EngineError::MeetingNotFound(id) => write!(f, "meeting not found: {id}"),
            EngineError::NotASeries(id) => write!(f, "not a recurring meeting: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::RoomInactive(id) => write!(f, "room retired: {id}"),
            EngineError::EndNotAfterStart => write!(f, "end time must be after start time"),
            EngineError::StartInPast => write!(f, "meeting cannot start in the past"),
            EngineError::CrossesDayBoundary => {
                write!(f, "meeting must start and end on the same day")
            }
            EngineError::InvalidLocalTime => {
                write!(f, "requested time does not exist in the scheduling zone")
            }
            EngineError::InvalidRecurrenceEnd => {
                write!(f, "recurrence end date must fall after the first occurrence")
            }
            EngineError::RoomConflict { room, conflicts } => {
                write!(f, "room {room} is busy: ")?;
                for (i, c) in conflicts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(
                        f,
                        "{} ({} - {})",
                        c.title,
                        c.start.format("%H:%M"),
                        c.end.format("%H:%M")
                    )?;
                }
                Ok(())
            }
            EngineError::ParticipantConflict { busy } => {
                write!(f, "participants busy: {}", busy.join(", "))
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "write-ahead log: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
