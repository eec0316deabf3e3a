//! Hard ceilings. Everything here is enforced at the mutation surface
//! so replayed state never exceeds what a live engine would accept.

use crate::model::Ms;

pub const MAX_ROOMS: usize = 4096;
pub const MAX_PEOPLE: usize = 65_536;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_PARTICIPANTS_PER_MEETING: usize = 256;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 512;
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Stepping iterations per series expansion, counting skipped
/// candidates. Bounds the work a single schedule call can do.
pub const RECURRENCE_MAX_STEPS: u32 = 100;

/// Widest availability window a single query may scan.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 60 * 60 * 1000;

/// Longest single meeting.
pub const MAX_SPAN_DURATION_MS: Ms = 24 * 60 * 60 * 1000;

/// Accepted instant range: 1970-01-01 through 2100-01-01 UTC.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
