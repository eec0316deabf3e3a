//! Pure conflict math over room timelines and attendance.
//!
//! Everything here works on half-open spans: two meetings clash when
//! `a.start < b.end && b.start < a.end`, so back-to-back bookings that
//! share an instant are legal.

use ulid::Ulid;

use crate::model::{RoomState, Slot, Span};

use super::store::BookingStore;

/// Slots in `room` overlapping `query`, ignoring the ids in `exclude`
/// (an edit never collides with itself, a series rewrite not with its
/// own members).
pub(super) fn overlapping_slots(room: &RoomState, query: &Span, exclude: &[Ulid]) -> Vec<Slot> {
    room.overlapping(query)
        .filter(|slot| !exclude.contains(&slot.id))
        .copied()
        .collect()
}

/// People among `users` holding a booking that overlaps `query`.
/// Preserves input order and reports each person at most once.
pub(super) fn busy_users(
    store: &BookingStore,
    users: &[Ulid],
    query: &Span,
    exclude: &[Ulid],
) -> Vec<Ulid> {
    let mut busy = Vec::new();
    for &user in users {
        if busy.contains(&user) {
            continue;
        }
        for booking_id in store.user_bookings(&user) {
            if exclude.contains(&booking_id) {
                continue;
            }
            if let Some(meeting) = store.get_meeting(&booking_id)
                && meeting.span.overlaps(query)
            {
                busy.push(user);
                break;
            }
        }
    }
    busy
}
