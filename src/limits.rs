//! Engine-wide bounds. Everything a caller could grow without limit gets a
//! cap here, surfaced as `EngineError::LimitExceeded`.

use crate::model::Ms;

pub const MAX_HALLS: usize = 10_000;

/// Windows + appointments (all states) on one hall's timeline.
pub const MAX_ENTRIES_PER_HALL: usize = 100_000;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ADDRESS_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

/// Sanity range for instants: 1970-01-01 .. 2100-01-01 UTC.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single window or appointment never spans more than a week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// Free-time queries are capped at roughly a quarter.
pub const MAX_QUERY_WINDOW_MS: Ms = 92 * 24 * 3_600_000;

/// Bulk window creation covers at most this many calendar days.
pub const MAX_BULK_RANGE_DAYS: i64 = 30;

/// Check-in opens this long before the appointment starts.
pub const CHECKIN_LEAD_MS: Ms = 3_600_000;
