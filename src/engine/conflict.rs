use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time;

use super::availability::{busy_users, overlapping_slots};
use super::{Engine, EngineError};

pub(super) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("meeting too long"));
    }
    Ok(())
}

pub(super) fn validate_draft_fields(draft: &MeetingDraft) -> Result<(), EngineError> {
    if draft.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if let Some(ref d) = draft.description
        && d.len() > MAX_DESCRIPTION_LEN
    {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if draft.participants.len() > MAX_PARTICIPANTS_PER_MEETING {
        return Err(EngineError::LimitExceeded("too many participants"));
    }
    Ok(())
}

impl Engine {
    /// Resolve a draft's wall-clock window into a UTC span.
    /// The window must be forward and stay within one civil day.
    pub(super) fn resolve_civil_span(&self, draft: &MeetingDraft) -> Result<Span, EngineError> {
        if draft.end <= draft.start {
            return Err(EngineError::EndNotAfterStart);
        }
        if draft.start.date() != draft.end.date() {
            return Err(EngineError::CrossesDayBoundary);
        }
        let start =
            time::local_to_ms(draft.start, self.zone).ok_or(EngineError::InvalidLocalTime)?;
        let end = time::local_to_ms(draft.end, self.zone).ok_or(EngineError::InvalidLocalTime)?;
        if end <= start {
            // A DST fold can invert a window that looked forward on the wall clock
            return Err(EngineError::EndNotAfterStart);
        }
        Ok(Span::new(start, end))
    }

    /// Check the organizer and every participant against the directory.
    /// Returns the cleaned participant list: sorted, deduplicated, and
    /// without the organizer (who attends implicitly).
    pub(super) fn resolve_people(
        &self,
        organizer: Ulid,
        participants: &[Ulid],
    ) -> Result<Vec<Ulid>, EngineError> {
        if !self.store.contains_person(&organizer) {
            return Err(EngineError::PersonNotFound(organizer));
        }
        let mut cleaned = participants.to_vec();
        cleaned.sort();
        cleaned.dedup();
        cleaned.retain(|p| *p != organizer);
        for p in &cleaned {
            if !self.store.contains_person(p) {
                return Err(EngineError::PersonNotFound(*p));
            }
        }
        Ok(cleaned)
    }

    /// Conflicting bookings in a room, with titles and civil times for reporting.
    pub(super) fn room_conflicts(
        &self,
        room: &RoomState,
        span: &Span,
        exclude: &[Ulid],
    ) -> Vec<ConflictBrief> {
        overlapping_slots(room, span, exclude)
            .into_iter()
            .map(|slot| ConflictBrief {
                id: slot.id,
                title: self
                    .store
                    .get_meeting(&slot.id)
                    .map(|m| m.title)
                    .unwrap_or_else(|| "reserved".into()),
                start: time::local_datetime(slot.span.start, self.zone),
                end: time::local_datetime(slot.span.end, self.zone),
            })
            .collect()
    }

    /// Directory names of the people among `users` busy during `span`.
    pub(super) fn busy_names(&self, users: &[Ulid], span: &Span, exclude: &[Ulid]) -> Vec<String> {
        busy_users(&self.store, users, span, exclude)
            .into_iter()
            .map(|uid| {
                self.store
                    .get_person(&uid)
                    .map(|p| p.name)
                    .unwrap_or_else(|| uid.to_string())
            })
            .collect()
    }
}
