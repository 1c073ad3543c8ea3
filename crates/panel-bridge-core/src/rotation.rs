//! Daily thread rotation predicate.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Calendar date of `now` in the deployment's configured offset.
#[must_use]
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Whether a thread created for `thread_date` must be rotated at `now`.
///
/// Detection is lazy (checked on line arrival or at the polling interval),
/// so rotation happens some time after midnight, never exactly at it.
#[must_use]
pub fn needs_rotation(thread_date: NaiveDate, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    local_date(now, offset) != thread_date
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_same_local_day_no_rotation() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        // 2026-03-14 23:00 JST == 14:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
        assert!(!needs_rotation(date, now, jst()));
    }

    #[test]
    fn test_rotates_any_time_past_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        // 2026-03-14 15:00:01 UTC == 2026-03-15 00:00:01 JST.
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 1).unwrap();
        assert!(needs_rotation(date, now, jst()));
    }

    #[test]
    fn test_offset_shifts_the_boundary() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 23, 30, 0).unwrap();
        // Still the 14th in UTC, already the 15th in JST.
        assert!(!needs_rotation(date, now, FixedOffset::east_opt(0).unwrap()));
        assert!(needs_rotation(date, now, jst()));
    }

    #[test]
    fn test_local_date() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 16, 0, 0).unwrap();
        assert_eq!(
            local_date(now, jst()),
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
        );
    }
}
