//! Calendar expansion for bulk window creation. All wall-time math happens
//! here, in the engine's canonical timezone; the rest of the engine only ever
//! sees UTC millisecond spans.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::model::{Ms, Span, WindowInfo};

/// One recurring-availability request: every matching weekday in
/// `[first_day, last_day]` gets a `[daily_start, daily_end)` window.
#[derive(Debug, Clone)]
pub struct BulkWindowRequest {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub daily_start: NaiveTime,
    pub daily_end: NaiveTime,
    pub weekdays: Vec<Weekday>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The synthesized window overlaps an existing one.
    WindowOverlap,
    /// The wall time does not exist (or is ambiguous) on this date in the
    /// canonical timezone — DST transition day.
    LocalTimeGap,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::WindowOverlap => write!(f, "overlaps an existing window"),
            SkipReason::LocalTimeGap => write!(f, "local time unmappable on this date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDay {
    pub date: NaiveDate,
    pub reason: SkipReason,
}

/// Per-date results of a bulk request. The batch is not atomic across dates:
/// created windows stay even when later dates are skipped.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub created: Vec<WindowInfo>,
    pub skipped: Vec<SkippedDay>,
}

/// Number of calendar days covered by `[first, last]`, inclusive.
/// Negative when the range is inverted.
pub fn range_days(first: NaiveDate, last: NaiveDate) -> i64 {
    (last - first).num_days() + 1
}

/// All dates in `[first, last]` whose weekday is in the filter, in order.
pub fn matching_days(first: NaiveDate, last: NaiveDate, weekdays: &[Weekday]) -> Vec<NaiveDate> {
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| weekdays.contains(&d.weekday()))
        .collect()
}

/// Map one date's wall-time window in `zone` to a UTC span. None when the
/// zone skips or duplicates the wall time (DST), or when the mapped span
/// comes out empty.
pub fn local_day_span(date: NaiveDate, start: NaiveTime, end: NaiveTime, zone: Tz) -> Option<Span> {
    let start_utc = zone
        .from_local_datetime(&date.and_time(start))
        .single()?
        .with_timezone(&Utc)
        .timestamp_millis();
    let end_utc = zone
        .from_local_datetime(&date.and_time(end))
        .single()?
        .with_timezone(&Utc)
        .timestamp_millis();
    (start_utc < end_utc).then(|| Span::new(start_utc, end_utc))
}

/// The calendar date at instant `now` in `zone`.
pub fn local_date_at(now: Ms, zone: Tz) -> Option<NaiveDate> {
    let utc: DateTime<Utc> = DateTime::from_timestamp_millis(now)?;
    Some(utc.with_timezone(&zone).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Belgrade;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn range_days_inclusive() {
        assert_eq!(range_days(d(2025, 6, 1), d(2025, 6, 1)), 1);
        assert_eq!(range_days(d(2025, 6, 1), d(2025, 6, 30)), 30);
        assert_eq!(range_days(d(2025, 6, 30), d(2025, 6, 1)), -28); // inverted
    }

    #[test]
    fn matching_days_filters_weekdays() {
        // 2025-06-02 is a Monday.
        let days = matching_days(d(2025, 6, 2), d(2025, 6, 8), &[Weekday::Mon, Weekday::Fri]);
        assert_eq!(days, vec![d(2025, 6, 2), d(2025, 6, 6)]);
    }

    #[test]
    fn matching_days_empty_filter() {
        assert!(matching_days(d(2025, 6, 2), d(2025, 6, 8), &[]).is_empty());
    }

    #[test]
    fn local_day_span_converts_to_utc() {
        // Belgrade is UTC+2 in June.
        let span = local_day_span(d(2025, 6, 2), t(8, 0), t(22, 0), Belgrade).unwrap();
        let day_utc = 1_748_822_400_000; // 2025-06-02T00:00:00Z
        assert_eq!(span.start, day_utc + 6 * 3_600_000);
        assert_eq!(span.end, day_utc + 20 * 3_600_000);
    }

    #[test]
    fn local_day_span_dst_gap_is_none() {
        // Belgrade skips 02:00–03:00 on 2025-03-30.
        assert!(local_day_span(d(2025, 3, 30), t(2, 30), t(5, 0), Belgrade).is_none());
    }

    #[test]
    fn local_day_span_dst_fold_is_none() {
        // 02:30 happens twice on 2025-10-26 — refuse to guess.
        assert!(local_day_span(d(2025, 10, 26), t(2, 30), t(5, 0), Belgrade).is_none());
    }

    #[test]
    fn local_day_span_inverted_times_is_none() {
        assert!(local_day_span(d(2025, 6, 2), t(22, 0), t(8, 0), Belgrade).is_none());
    }

    #[test]
    fn local_date_follows_zone() {
        // 23:30 UTC on June 1st is already June 2nd in Belgrade (UTC+2).
        let ms = 1_748_822_400_000 - 30 * 60_000;
        assert_eq!(local_date_at(ms, Belgrade), Some(d(2025, 6, 2)));
        assert_eq!(local_date_at(ms, chrono_tz::UTC), Some(d(2025, 6, 1)));
    }
}
