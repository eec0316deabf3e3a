//! Civil-time helpers over the engine's single zone. Nothing in here
//! reads ambient time; callers pass explicit instants, which lets
//! tests pin "now" through the injected clock.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{
    DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

use crate::model::{Frequency, Ms, Span};

/// Injected clock capability.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;
}

/// Wall clock for production use.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as Ms
    }
}

/// Settable clock for tests and replayable embedders.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: Ms) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: Ms) {
        self.0.store(now, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> Ms {
        self.0.load(Ordering::Relaxed)
    }
}

/// Resolve a civil wall-clock time in `zone` to a UTC instant.
/// Ambiguous times (DST fold) take the earlier offset; nonexistent
/// times (DST gap) resolve to `None`.
pub fn local_to_ms(local: NaiveDateTime, zone: Tz) -> Option<Ms> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Interpret a stored instant in the engine's zone.
pub fn ms_to_local(ms: Ms, zone: Tz) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .expect("timestamp within validated range")
        .with_timezone(&zone)
}

pub fn local_date(ms: Ms, zone: Tz) -> NaiveDate {
    ms_to_local(ms, zone).date_naive()
}

pub fn local_datetime(ms: Ms, zone: Tz) -> NaiveDateTime {
    ms_to_local(ms, zone).naive_local()
}

pub fn same_local_day(a: Ms, b: Ms, zone: Tz) -> bool {
    local_date(a, zone) == local_date(b, zone)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Advance one recurrence period. Monthly addition clamps to the last
/// valid day of the target month (Jan 31 → Feb 28), and later steps
/// continue from the clamped date.
pub fn step_date(date: NaiveDate, freq: Frequency) -> Option<NaiveDate> {
    match freq {
        Frequency::Daily => date.checked_add_days(Days::new(1)),
        Frequency::Weekly => date.checked_add_days(Days::new(7)),
        Frequency::Monthly => date.checked_add_months(Months::new(1)),
    }
}

/// Combine a candidate date with anchored times-of-day into a UTC span.
/// `None` when either endpoint is unrepresentable in the zone or the
/// resolved span would not be forward.
pub fn span_on_date(date: NaiveDate, start: NaiveTime, end: NaiveTime, zone: Tz) -> Option<Span> {
    let start_ms = local_to_ms(NaiveDateTime::new(date, start), zone)?;
    let end_ms = local_to_ms(NaiveDateTime::new(date, end), zone)?;
    if end_ms <= start_ms {
        return None;
    }
    Some(Span::new(start_ms, end_ms))
}
