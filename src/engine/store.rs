use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedRoomState;

/// Concurrent in-memory working set, rebuilt from the WAL on open.
/// Room timelines live behind per-room locks; the directory and the
/// meeting indexes are lock-free maps.
pub struct BookingStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    people: DashMap<Ulid, Person>,
    meetings: DashMap<Ulid, Booking>,
    /// booking id → room id
    booking_room: DashMap<Ulid, Ulid>,
    /// person id → bookings they organize or attend
    attendance: DashMap<Ulid, Vec<Ulid>>,
    /// series base id → child booking ids
    series: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            people: DashMap::new(),
            meetings: DashMap::new(),
            booking_room: DashMap::new(),
            attendance: DashMap::new(),
            series: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, state: RoomState) {
        self.rooms.insert(state.id, Arc::new(RwLock::new(state)));
    }

    pub fn rooms_snapshot(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    // ── People ───────────────────────────────────────────────

    pub fn person_count(&self) -> usize {
        self.people.len()
    }

    pub fn contains_person(&self, id: &Ulid) -> bool {
        self.people.contains_key(id)
    }

    pub fn get_person(&self, id: &Ulid) -> Option<Person> {
        self.people.get(id).map(|e| e.value().clone())
    }

    pub fn insert_person(&self, person: Person) {
        self.people.insert(person.id, person);
    }

    pub fn people_snapshot(&self) -> Vec<Person> {
        let mut people: Vec<Person> = self.people.iter().map(|e| e.value().clone()).collect();
        people.sort_by(|a, b| a.name.cmp(&b.name));
        people
    }

    // ── Meetings and indexes ─────────────────────────────────

    pub fn meeting_count(&self) -> usize {
        self.meetings.len()
    }

    pub fn get_meeting(&self, id: &Ulid) -> Option<Booking> {
        self.meetings.get(id).map(|e| e.value().clone())
    }

    pub fn meetings_snapshot(&self) -> Vec<Booking> {
        self.meetings.iter().map(|e| e.value().clone()).collect()
    }

    pub fn room_for_booking(&self, id: &Ulid) -> Option<Ulid> {
        self.booking_room.get(id).map(|e| *e.value())
    }

    pub fn user_bookings(&self, user: &Ulid) -> Vec<Ulid> {
        self.attendance
            .get(user)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn children_of(&self, base: &Ulid) -> Vec<Ulid> {
        self.series
            .get(base)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// Insert a meeting and maintain every index. The organizer is
    /// indexed once even when also listed as a participant.
    pub fn insert_meeting(&self, meeting: Booking) {
        let id = meeting.id;
        self.booking_room.insert(id, meeting.room_id);
        self.attendance
            .entry(meeting.organizer_id)
            .or_default()
            .push(id);
        for &p in &meeting.participants {
            if p != meeting.organizer_id {
                self.attendance.entry(p).or_default().push(id);
            }
        }
        if let Some(parent) = meeting.parent_id {
            self.series.entry(parent).or_default().push(id);
        }
        self.meetings.insert(id, meeting);
    }

    /// Remove a meeting and scrub it from every index.
    pub fn remove_meeting(&self, id: &Ulid) -> Option<Booking> {
        let (_, meeting) = self.meetings.remove(id)?;
        self.booking_room.remove(id);
        self.unindex_attendee(meeting.organizer_id, id);
        for &p in &meeting.participants {
            self.unindex_attendee(p, id);
        }
        if let Some(parent) = meeting.parent_id
            && let Some(mut kids) = self.series.get_mut(&parent)
        {
            kids.retain(|c| c != id);
        }
        self.series.remove(id);
        Some(meeting)
    }

    /// Swap in a new version of a meeting, reindexing room, attendance
    /// and series membership.
    pub fn replace_meeting(&self, meeting: Booking) {
        self.remove_meeting(&meeting.id);
        self.insert_meeting(meeting);
    }

    fn unindex_attendee(&self, person: Ulid, booking: &Ulid) {
        if let Some(mut list) = self.attendance.get_mut(&person) {
            list.retain(|b| b != booking);
        }
    }
}
