use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::time;

use super::{Engine, EngineError};

impl Engine {
    /// Resolve a civil query window to a UTC span. Unlike a meeting, a
    /// query window may cover several days.
    fn resolve_query_span(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Span, EngineError> {
        if end <= start {
            return Err(EngineError::EndNotAfterStart);
        }
        let start_ms = time::local_to_ms(start, self.zone).ok_or(EngineError::InvalidLocalTime)?;
        let end_ms = time::local_to_ms(end, self.zone).ok_or(EngineError::InvalidLocalTime)?;
        if end_ms <= start_ms {
            return Err(EngineError::EndNotAfterStart);
        }
        if end_ms - start_ms > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        Ok(Span::new(start_ms, end_ms))
    }

    /// Report whether a room is free over a candidate window, and if
    /// not, which bookings stand in the way. A room nobody registered
    /// has nothing booked, so it reports free.
    pub async fn check_room_availability(
        &self,
        room_id: Ulid,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<Ulid>,
    ) -> Result<RoomAvailability, EngineError> {
        let query = self.resolve_query_span(start, end)?;
        let rs = match self.store.get_room(&room_id) {
            Some(rs) => rs,
            None => {
                return Ok(RoomAvailability {
                    free: true,
                    conflicts: Vec::new(),
                });
            }
        };
        let guard = rs.read().await;
        let conflicts = self.room_conflicts(&guard, &query, exclude.as_slice());
        Ok(RoomAvailability {
            free: conflicts.is_empty(),
            conflicts,
        })
    }

    /// Report which of the given people already have a booking inside
    /// the window. Unknown ids have no bookings and count as free.
    pub fn check_user_availability(
        &self,
        user_ids: &[Ulid],
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<Ulid>,
    ) -> Result<UserAvailability, EngineError> {
        let query = self.resolve_query_span(start, end)?;
        let busy = self.busy_names(user_ids, &query, exclude.as_slice());
        Ok(UserAvailability {
            free: busy.is_empty(),
            busy,
        })
    }

    /// Bookings a user attends that have not started yet, soonest first.
    pub fn upcoming_for_user(&self, user_id: Ulid, limit: usize) -> Vec<Booking> {
        let now = self.now_ms();
        let mut out: Vec<Booking> = self
            .store
            .user_bookings(&user_id)
            .iter()
            .filter_map(|id| self.store.get_meeting(id))
            .filter(|m| m.span.start >= now)
            .collect();
        out.sort_by_key(|m| m.span.start);
        out.truncate(limit);
        out
    }

    /// Everything on a user's calendar for one civil day.
    pub fn meetings_on_day(&self, user_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .store
            .user_bookings(&user_id)
            .iter()
            .filter_map(|id| self.store.get_meeting(id))
            .filter(|m| time::local_date(m.span.start, self.zone) == date)
            .collect();
        out.sort_by_key(|m| m.span.start);
        out
    }

    /// Meetings a user organized, newest first.
    pub fn organized_by(&self, user_id: Ulid) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .store
            .user_bookings(&user_id)
            .iter()
            .filter_map(|id| self.store.get_meeting(id))
            .filter(|m| m.organizer_id == user_id)
            .collect();
        out.sort_by_key(|m| std::cmp::Reverse(m.span.start));
        out
    }

    /// A series in full: base first, then children in start order.
    pub fn series_of(&self, id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let target = self.meeting(&id)?;
        if target.parent_id.is_none() && target.recurrence.is_none() {
            return Err(EngineError::NotASeries(id));
        }
        let base_id = target.parent_id.unwrap_or(target.id);
        let base = self.meeting(&base_id)?;

        let mut out = vec![base];
        out.extend(self.series_children_sorted(&base_id));
        Ok(out)
    }

    /// Every booking in a room, in start order.
    pub async fn room_bookings(&self, room_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = match self.store.get_room(&room_id) {
            Some(rs) => rs,
            None => return Ok(Vec::new()),
        };
        let guard = rs.read().await;
        Ok(guard
            .slots
            .iter()
            .filter_map(|slot| self.store.get_meeting(&slot.id))
            .collect())
    }

    pub async fn rooms(&self) -> Vec<Room> {
        let mut out = Vec::with_capacity(self.store.room_count());
        for rs in self.store.rooms_snapshot() {
            let guard = rs.read().await;
            out.push(Room {
                id: guard.id,
                name: guard.name.clone(),
                active: guard.active,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn people(&self) -> Vec<Person> {
        self.store.people_snapshot()
    }

    /// Whole-schedule feed with RFC 3339 local timestamps, in start
    /// order.
    pub async fn calendar_feed(&self) -> serde_json::Value {
        let mut room_names = HashMap::new();
        for rs in self.store.rooms_snapshot() {
            let guard = rs.read().await;
            room_names.insert(guard.id, guard.name.clone());
        }

        let mut meetings = self.store.meetings_snapshot();
        meetings.sort_by_key(|m| m.span.start);
        let events: Vec<CalendarEvent> = meetings
            .into_iter()
            .map(|m| CalendarEvent {
                id: m.id,
                title: m.title,
                room: room_names.get(&m.room_id).cloned().unwrap_or_default(),
                start: time::ms_to_local(m.span.start, self.zone).to_rfc3339(),
                end: time::ms_to_local(m.span.end, self.zone).to_rfc3339(),
            })
            .collect();
        serde_json::to_value(events).unwrap_or(serde_json::json!([]))
    }
}
