//! Series expansion: stepping a recurrence rule into child bookings.

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::limits::RECURRENCE_MAX_STEPS;
use crate::model::{Booking, Event, Expansion, Frequency, RecurrenceRule};
use crate::time;

use super::{Engine, EngineError};

/// Candidate dates after the base occurrence, oldest first.
///
/// Stepping is bounded by `RECURRENCE_MAX_STEPS` iterations, and a
/// weekend skip in a daily rule consumes an iteration. A far-future
/// `until` therefore caps out instead of running away.
pub(super) fn occurrence_dates(base: NaiveDate, rule: &RecurrenceRule) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = base;
    for _ in 0..RECURRENCE_MAX_STEPS {
        let Some(next) = time::step_date(current, rule.freq) else {
            break;
        };
        current = next;
        if current > rule.until {
            break;
        }
        if rule.freq == Frequency::Daily && time::is_weekend(current) {
            continue;
        }
        dates.push(current);
    }
    dates
}

impl Engine {
    /// Materialize a base booking's rule into child bookings. The
    /// submitted civil start and end anchor the stepping date and the
    /// time-of-day of every occurrence.
    ///
    /// The room lock is held across the whole walk, so nothing can
    /// steal a slot between a conflict check and its insert. A
    /// candidate that clashes, or that resolves to a nonexistent
    /// wall-clock time, is dropped and counted; the walk continues.
    pub(super) async fn expand_series(
        &self,
        base: &Booking,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Expansion, EngineError> {
        let Some(rule) = base.recurrence else {
            return Ok(Expansion::default());
        };

        let zone = self.zone;
        let start_tod = start.time();
        let end_tod = end.time();

        let mut guard = self.room_write(&base.room_id).await?;

        let mut expansion = Expansion::default();
        for date in occurrence_dates(start.date(), &rule) {
            let Some(span) = time::span_on_date(date, start_tod, end_tod, zone) else {
                expansion.skipped += 1;
                metrics::counter!(crate::observability::OCCURRENCES_SKIPPED_TOTAL).increment(1);
                continue;
            };
            if guard.overlapping(&span).next().is_some() {
                expansion.skipped += 1;
                metrics::counter!(crate::observability::OCCURRENCES_SKIPPED_TOTAL).increment(1);
                continue;
            }

            let child = Booking {
                id: Ulid::new(),
                title: base.title.clone(),
                description: base.description.clone(),
                span,
                room_id: base.room_id,
                organizer_id: base.organizer_id,
                participants: base.participants.clone(),
                parent_id: Some(base.id),
                recurrence: None,
                created_at: self.now_ms(),
            };
            let event = Event::MeetingScheduled {
                meeting: child.clone(),
            };
            if let Err(e) = self.persist_and_apply(base.room_id, &mut guard, &event).await {
                tracing::error!(
                    "series expansion halted after {} children: {e}",
                    expansion.created.len()
                );
                break;
            }
            metrics::counter!(crate::observability::OCCURRENCES_CREATED_TOTAL).increment(1);
            expansion.created.push(child);
        }
        Ok(expansion)
    }
}
