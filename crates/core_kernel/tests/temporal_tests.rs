//! Unit tests for the Temporal module
//!
//! Tests cover ValidityWindow, DateRange and Timezone functionality.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use core_kernel::temporal::{DateRange, TemporalError, Timezone, ValidityWindow};
use proptest::prelude::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod validity_window {
    use super::*;

    #[test]
    fn test_new_creates_bounded_window() {
        let window = ValidityWindow::new(date(2024, 6, 1), Some(date(2026, 5, 31))).unwrap();
        assert_eq!(window.from, date(2024, 6, 1));
        assert_eq!(window.to, Some(date(2026, 5, 31)));
        assert!(!window.is_open_ended());
    }

    #[test]
    fn test_single_day_window_is_valid() {
        let window = ValidityWindow::new(date(2024, 6, 1), Some(date(2024, 6, 1))).unwrap();
        assert!(window.contains(date(2024, 6, 1)));
    }

    #[test]
    fn test_new_fails_when_from_after_to() {
        let result = ValidityWindow::new(date(2024, 6, 2), Some(date(2024, 6, 1)));
        assert!(matches!(result, Err(TemporalError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_open_ended_contains_far_future() {
        let window = ValidityWindow::open_from(date(2024, 6, 1));
        assert!(window.is_open_ended());
        assert!(window.contains(date(2099, 12, 31)));
        assert!(!window.contains(date(2024, 5, 31)));
    }

    #[test]
    fn test_overlap_on_shared_boundary_day() {
        let old = ValidityWindow::new(date(2022, 4, 1), Some(date(2024, 5, 31))).unwrap();
        let new = ValidityWindow::open_from(date(2024, 5, 31));
        assert!(old.overlaps(&new));
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        let old = ValidityWindow::new(date(2022, 4, 1), Some(date(2024, 5, 31))).unwrap();
        let new = ValidityWindow::open_from(date(2024, 6, 1));
        assert!(!old.overlaps(&new));
    }

    proptest! {
        #[test]
        fn prop_contains_matches_inclusive_bounds(
            from_offset in 0i64..2000,
            len in 0i64..2000,
            probe_offset in 0i64..5000,
        ) {
            let base = date(2020, 1, 1);
            let from = base + chrono::Duration::days(from_offset);
            let to = from + chrono::Duration::days(len);
            let probe = base + chrono::Duration::days(probe_offset);
            let window = ValidityWindow::new(from, Some(to)).unwrap();

            prop_assert_eq!(window.contains(probe), probe >= from && probe <= to);
        }
    }
}

mod date_range {
    use super::*;

    #[test]
    fn test_new_fails_when_start_after_end() {
        let result = DateRange::new(date(2024, 3, 2), date(2024, 3, 1));
        assert!(matches!(result, Err(TemporalError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_days_counts_both_ends() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap();
        assert_eq!(range.days(), 31);
        assert_eq!(DateRange::single_day(date(2024, 3, 1)).days(), 1);
    }

    #[test]
    fn test_month_of_leap_february() {
        let month = DateRange::month_of(date(2024, 2, 10)).unwrap();
        assert_eq!(month.start, date(2024, 2, 1));
        assert_eq!(month.end, date(2024, 2, 29));
    }

    #[test]
    fn test_month_of_first_and_last_day() {
        assert_eq!(DateRange::month_of(date(2024, 4, 1)).unwrap().end, date(2024, 4, 30));
        assert_eq!(DateRange::month_of(date(2024, 4, 30)).unwrap().start, date(2024, 4, 1));
    }

    #[test]
    fn test_trailing_window_crosses_month() {
        let window = DateRange::trailing(date(2024, 3, 5), 14).unwrap();
        assert_eq!(window.start, date(2024, 2, 21));
        assert_eq!(window.end, date(2024, 3, 5));
        assert!(window.contains(date(2024, 2, 21)));
        assert!(!window.contains(date(2024, 2, 20)));
    }

    #[test]
    fn test_truncate_to_visit_date() {
        let month = DateRange::month_of(date(2024, 3, 12)).unwrap();
        let to_date = month.truncate_to(date(2024, 3, 12));
        assert_eq!(to_date.start, date(2024, 3, 1));
        assert_eq!(to_date.end, date(2024, 3, 12));
    }
}

mod timezone {
    use super::*;

    #[test]
    fn test_default_is_utc() {
        assert_eq!(Timezone::default().name(), "UTC");
    }

    #[test]
    fn test_parse_iana_name() {
        let tz: Timezone = "Asia/Tokyo".parse().unwrap();
        assert_eq!(tz.name(), "Asia/Tokyo");
    }

    #[test]
    fn test_parse_unknown_name_fails() {
        let result: Result<Timezone, _> = "Nowhere/Special".parse();
        assert!(matches!(result, Err(TemporalError::UnknownTimezone(_))));
    }

    #[test]
    fn test_local_date_rolls_over_midnight() {
        let tz: Timezone = "Asia/Tokyo".parse().unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 4, 1, 16, 30, 0).unwrap();
        assert_eq!(tz.local_date(utc), date(2024, 4, 2));
        assert_eq!(tz.local_time(utc), NaiveTime::from_hms_opt(1, 30, 0).unwrap());
    }

    #[test]
    fn test_json_roundtrip() {
        let tz: Timezone = "Asia/Tokyo".parse().unwrap();
        let json = serde_json::to_string(&tz).unwrap();
        assert_eq!(json, "\"Asia/Tokyo\"");
        let back: Timezone = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tz);
    }
}
