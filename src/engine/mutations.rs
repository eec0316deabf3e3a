use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::NoticeKind;
use crate::time;

use super::conflict::{validate_draft_fields, validate_span};
use super::{Engine, EngineError, WriterOp};

impl Engine {
    // ── Directory ────────────────────────────────────────────

    pub async fn add_room(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if self.store.contains_room(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomAdded {
            id,
            name: name.clone(),
            active: true,
        };
        self.wal_append(&event).await?;
        self.store.insert_room(RoomState::new(id, name, true));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Retire a room: no new bookings land in it, existing ones stay.
    /// Retiring an already-retired room is a no-op.
    pub async fn retire_room(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.room_write(&id).await?;
        if !guard.active {
            return Ok(());
        }
        let event = Event::RoomRetired { id };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn register_person(
        &self,
        id: Ulid,
        name: String,
        email: String,
    ) -> Result<(), EngineError> {
        if self.store.person_count() >= MAX_PEOPLE {
            return Err(EngineError::LimitExceeded("too many people"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("person name too long"));
        }
        if email.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("email too long"));
        }
        if self.store.contains_person(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::PersonAdded {
            id,
            name: name.clone(),
            email: email.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_person(Person { id, name, email });
        Ok(())
    }

    // ── Scheduling ───────────────────────────────────────────

    /// Validate and commit a meeting, then expand its rule (if any)
    /// into child bookings. The room's write lock is held from the
    /// conflict check through the insert, so a concurrent schedule for
    /// the same slot loses cleanly instead of double-booking.
    pub async fn schedule_meeting(
        &self,
        id: Ulid,
        draft: MeetingDraft,
    ) -> Result<ScheduleOutcome, EngineError> {
        validate_draft_fields(&draft)?;
        if self.store.get_meeting(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        let span = self.resolve_civil_span(&draft)?;
        validate_span(&span)?;
        if span.start < self.now_ms() {
            return Err(EngineError::StartInPast);
        }
        if let Some(rule) = draft.recurrence
            && rule.until <= draft.start.date()
        {
            return Err(EngineError::InvalidRecurrenceEnd);
        }
        let participants = self.resolve_people(draft.organizer_id, &draft.participants)?;

        let rs = self
            .store
            .get_room(&draft.room_id)
            .ok_or(EngineError::RoomNotFound(draft.room_id))?;
        let mut guard = rs.write_owned().await;
        if !guard.active {
            return Err(EngineError::RoomInactive(draft.room_id));
        }
        if guard.slots.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings in room"));
        }

        let conflicts = self.room_conflicts(&guard, &span, &[]);
        if !conflicts.is_empty() {
            metrics::counter!(crate::observability::ROOM_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::RoomConflict {
                room: guard.name.clone(),
                conflicts,
            });
        }

        let mut attendees = vec![draft.organizer_id];
        attendees.extend(participants.iter().copied());
        let busy = self.busy_names(&attendees, &span, &[]);
        if !busy.is_empty() {
            metrics::counter!(crate::observability::PARTICIPANT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::ParticipantConflict { busy });
        }

        let meeting = Booking {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            span,
            room_id: draft.room_id,
            organizer_id: draft.organizer_id,
            participants,
            parent_id: None,
            recurrence: draft.recurrence,
            created_at: self.now_ms(),
        };
        let room_name = guard.name.clone();
        let event = Event::MeetingScheduled {
            meeting: meeting.clone(),
        };
        self.persist_and_apply(draft.room_id, &mut guard, &event).await?;
        let kind = if meeting.recurrence.is_some() { "series" } else { "single" };
        metrics::counter!(crate::observability::MEETINGS_SCHEDULED_TOTAL, "kind" => kind)
            .increment(1);
        drop(guard);

        let expansion = self.expand_series(&meeting, draft.start, draft.end).await?;

        self.file_notices(&meeting, NoticeKind::Scheduled, &room_name);

        Ok(ScheduleOutcome { meeting, expansion })
    }

    // ── Edits ────────────────────────────────────────────────

    /// Rewrite a single booking. Series membership and any recurrence
    /// rule on it are preserved; only this occurrence moves.
    pub async fn edit_occurrence(&self, id: Ulid, draft: MeetingDraft) -> Result<Booking, EngineError> {
        validate_draft_fields(&draft)?;
        let existing = self.meeting(&id)?;
        let span = self.resolve_civil_span(&draft)?;
        validate_span(&span)?;
        let participants = self.resolve_people(draft.organizer_id, &draft.participants)?;

        self.commit_edit(&existing, &draft, span, participants, existing.recurrence, &[id])
            .await
    }

    /// Rewrite a whole series from any of its members: the base takes
    /// the draft (including its new rule, or none) and the rule is
    /// expanded afresh in place of the old children. The replacement is
    /// validated and committed before any child is removed, so a
    /// rejected edit leaves the series exactly as it was.
    pub async fn edit_series(&self, id: Ulid, draft: MeetingDraft) -> Result<ScheduleOutcome, EngineError> {
        let target = self.meeting(&id)?;
        if target.parent_id.is_none() && target.recurrence.is_none() {
            return Err(EngineError::NotASeries(id));
        }
        let base_id = target.parent_id.unwrap_or(target.id);
        let base = self.meeting(&base_id)?;

        validate_draft_fields(&draft)?;
        let span = self.resolve_civil_span(&draft)?;
        validate_span(&span)?;
        if span.start < self.now_ms() {
            return Err(EngineError::StartInPast);
        }
        if let Some(rule) = draft.recurrence
            && rule.until <= draft.start.date()
        {
            return Err(EngineError::InvalidRecurrenceEnd);
        }
        let participants = self.resolve_people(draft.organizer_id, &draft.participants)?;

        // The new window is checked against the world minus the series
        // itself; the members it masks are replaced or removed below.
        let children = self.series_children_sorted(&base_id);
        let mut members = vec![base_id];
        members.extend(children.iter().map(|c| c.id));

        let updated = self
            .commit_edit(&base, &draft, span, participants, draft.recurrence, &members)
            .await?;
        for child in &children {
            self.remove_one(child, false).await?;
        }
        let expansion = self.expand_series(&updated, draft.start, draft.end).await?;

        Ok(ScheduleOutcome {
            meeting: updated,
            expansion,
        })
    }

    /// Shared tail of both edit flows: conflict-check the new window
    /// against everything but `exclude` (the booking's own footprint,
    /// or the whole series on a series rewrite), write the replacement
    /// record, and move the slot between rooms when needed. Nothing is
    /// written until the checks pass.
    async fn commit_edit(
        &self,
        existing: &Booking,
        draft: &MeetingDraft,
        span: Span,
        participants: Vec<Ulid>,
        recurrence: Option<RecurrenceRule>,
        exclude: &[Ulid],
    ) -> Result<Booking, EngineError> {
        let id = existing.id;
        let mut attendees = vec![draft.organizer_id];
        attendees.extend(participants.iter().copied());

        let updated = Booking {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            span,
            room_id: draft.room_id,
            organizer_id: draft.organizer_id,
            participants,
            parent_id: existing.parent_id,
            recurrence,
            created_at: existing.created_at,
        };
        let event = Event::MeetingUpdated {
            meeting: updated.clone(),
        };

        if draft.room_id == existing.room_id {
            let mut guard = self.room_write(&existing.room_id).await?;

            let conflicts = self.room_conflicts(&guard, &span, exclude);
            if !conflicts.is_empty() {
                metrics::counter!(crate::observability::ROOM_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::RoomConflict {
                    room: guard.name.clone(),
                    conflicts,
                });
            }
            let busy = self.busy_names(&attendees, &span, exclude);
            if !busy.is_empty() {
                metrics::counter!(crate::observability::PARTICIPANT_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::ParticipantConflict { busy });
            }

            let room_name = guard.name.clone();
            self.persist_and_apply(existing.room_id, &mut guard, &event).await?;
            drop(guard);
            self.file_notices(&updated, NoticeKind::Updated, &room_name);
            return Ok(updated);
        }

        // Moving rooms: take both locks in id order to avoid deadlock.
        let source = self
            .store
            .get_room(&existing.room_id)
            .ok_or(EngineError::RoomNotFound(existing.room_id))?;
        let target = self
            .store
            .get_room(&draft.room_id)
            .ok_or(EngineError::RoomNotFound(draft.room_id))?;
        let (mut source_guard, mut target_guard) = if existing.room_id < draft.room_id {
            let s = source.write_owned().await;
            let t = target.write_owned().await;
            (s, t)
        } else {
            let t = target.write_owned().await;
            let s = source.write_owned().await;
            (s, t)
        };

        if !target_guard.active {
            return Err(EngineError::RoomInactive(draft.room_id));
        }
        if target_guard.slots.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings in room"));
        }
        let conflicts = self.room_conflicts(&target_guard, &span, exclude);
        if !conflicts.is_empty() {
            metrics::counter!(crate::observability::ROOM_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::RoomConflict {
                room: target_guard.name.clone(),
                conflicts,
            });
        }
        let busy = self.busy_names(&attendees, &span, exclude);
        if !busy.is_empty() {
            metrics::counter!(crate::observability::PARTICIPANT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::ParticipantConflict { busy });
        }

        self.wal_append(&event).await?;
        source_guard.remove_slot(id);
        target_guard.insert_slot(Slot { id, span });
        self.store.replace_meeting(updated.clone());
        self.notify.send(existing.room_id, &event);
        self.notify.send(draft.room_id, &event);
        let room_name = target_guard.name.clone();
        drop(source_guard);
        drop(target_guard);

        self.file_notices(&updated, NoticeKind::Updated, &room_name);
        Ok(updated)
    }

    // ── Cancellation ─────────────────────────────────────────

    /// Cancel one booking. Pointing at a series base cancels the whole
    /// series, since the children only exist through it.
    pub async fn cancel_occurrence(&self, id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let meeting = self.meeting(&id)?;
        if meeting.recurrence.is_some() {
            return self.cancel_series(id).await;
        }
        self.remove_one(&meeting, true).await?;
        Ok(vec![id])
    }

    /// Cancel a whole series from any of its members.
    pub async fn cancel_series(&self, id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let target = self.meeting(&id)?;
        if target.parent_id.is_none() && target.recurrence.is_none() {
            return Err(EngineError::NotASeries(id));
        }
        let base_id = target.parent_id.unwrap_or(target.id);
        let base = self.meeting(&base_id)?;

        let mut cancelled = vec![base_id];
        for child in self.series_children_sorted(&base_id) {
            self.remove_one(&child, false).await?;
            cancelled.push(child.id);
        }
        self.remove_one(&base, true).await?;
        Ok(cancelled)
    }

    /// Cancel a series member and every later occurrence. From the
    /// base this is the whole series; from a child, earlier
    /// occurrences and the base survive.
    pub async fn cancel_from(&self, id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let target = self.meeting(&id)?;
        let Some(base_id) = target.parent_id else {
            return self.cancel_series(id).await;
        };

        let mut cancelled = Vec::new();
        for child in self.series_children_sorted(&base_id) {
            if child.span.start < target.span.start {
                continue;
            }
            self.remove_one(&child, child.id == id).await?;
            cancelled.push(child.id);
        }
        Ok(cancelled)
    }

    /// Remove exactly one booking: slot, WAL record, indexes.
    async fn remove_one(&self, meeting: &Booking, notices: bool) -> Result<(), EngineError> {
        let mut guard = self.room_write(&meeting.room_id).await?;
        let room_name = guard.name.clone();
        let event = Event::MeetingCancelled {
            id: meeting.id,
            room_id: meeting.room_id,
        };
        self.persist_and_apply(meeting.room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::MEETINGS_CANCELLED_TOTAL).increment(1);
        drop(guard);

        if notices {
            self.file_notices(meeting, NoticeKind::Cancelled, &room_name);
        }
        Ok(())
    }

    pub(super) fn series_children_sorted(&self, base_id: &Ulid) -> Vec<Booking> {
        let mut children: Vec<Booking> = self
            .store
            .children_of(base_id)
            .iter()
            .filter_map(|cid| self.store.get_meeting(cid))
            .collect();
        children.sort_by_key(|c| c.span.start);
        children
    }

    fn file_notices(&self, meeting: &Booking, kind: NoticeKind, room_name: &str) {
        if meeting.participants.is_empty() {
            return;
        }
        let verb = match kind {
            NoticeKind::Scheduled => "scheduled",
            NoticeKind::Updated => "updated",
            NoticeKind::Cancelled => "cancelled",
        };
        let when = time::local_datetime(meeting.span.start, self.zone).format("%Y-%m-%d %H:%M");
        let message = format!("'{}' in {room_name} {verb} for {when}", meeting.title);
        let now = self.now_ms();
        for &p in &meeting.participants {
            self.inbox.push(p, kind, meeting.id, message.clone(), now);
        }
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Bookings whose window has fully passed. A series base lingers
    /// until its last child has also ended, so the series stays
    /// addressable while any occurrence is still ahead.
    pub fn collect_expired_meetings(&self, now: Ms) -> Vec<Ulid> {
        let mut expired = Vec::new();
        for meeting in self.store.meetings_snapshot() {
            if meeting.span.end > now {
                continue;
            }
            if meeting.recurrence.is_some() {
                let any_live = self
                    .store
                    .children_of(&meeting.id)
                    .iter()
                    .filter_map(|cid| self.store.get_meeting(cid))
                    .any(|c| c.span.end > now);
                if any_live {
                    continue;
                }
            }
            expired.push(meeting.id);
        }
        expired
    }

    /// Remove an ended booking without filing inbox notices.
    pub async fn purge_meeting(&self, id: Ulid) -> Result<(), EngineError> {
        let meeting = self.meeting(&id)?;
        self.remove_one(&meeting, false).await
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for rs in self.store.rooms_snapshot() {
            let guard = rs.read().await;
            events.push(Event::RoomAdded {
                id: guard.id,
                name: guard.name.clone(),
                active: guard.active,
            });
        }
        for person in self.store.people_snapshot() {
            events.push(Event::PersonAdded {
                id: person.id,
                name: person.name,
                email: person.email,
            });
        }
        // Bases first, then children, each group in start order
        let mut meetings = self.store.meetings_snapshot();
        meetings.sort_by_key(|m| (m.parent_id.is_some(), m.span.start));
        for meeting in meetings {
            events.push(Event::MeetingScheduled { meeting });
        }

        let (done, wait) = oneshot::channel();
        self.writer
            .send(WriterOp::Rewrite(events, done))
            .await
            .map_err(|_| EngineError::WalError("log writer is gone".into()))?;
        wait.await
            .map_err(|_| EngineError::WalError("log writer dropped the reply".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (done, wait) = oneshot::channel();
        if self.writer.send(WriterOp::Backlog(done)).await.is_err() {
            return 0;
        }
        wait.await.unwrap_or(0)
    }
}
