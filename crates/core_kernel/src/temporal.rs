//! Date and time handling types
//!
//! This module provides the calendar primitives the bonus engine works with:
//! - Validity windows: when a versioned rule is in force (inclusive dates)
//! - Date ranges: inclusive spans such as a calendar month or a trailing window
//! - Timezones: conversion of recorded UTC timestamps to local civic time

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use std::str::FromStr;

/// Timezone wrapper for facility locations
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Tz::from_str(&s)
            .map(Timezone)
            .map_err(|_| serde::de::Error::custom(format!("Invalid timezone: {}", s)))
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Converts a UTC datetime to the local timezone
    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.0)
    }

    /// Returns the local wall-clock time of a UTC instant
    pub fn local_time(&self, utc: DateTime<Utc>) -> NaiveTime {
        self.to_local(utc).time()
    }

    /// Returns the local calendar date of a UTC instant
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        self.to_local(utc).date_naive()
    }

    /// Returns the IANA name of the zone
    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Date out of supported range: {0}")]
    OutOfRange(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// The window during which a versioned record is in force
///
/// Both bounds are inclusive calendar dates. An absent `to` means the
/// window is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// First day the record applies
    pub from: NaiveDate,
    /// Last day the record applies, None means unbounded
    pub to: Option<NaiveDate>,
}

impl ValidityWindow {
    /// Creates a new validity window
    pub fn new(from: NaiveDate, to: Option<NaiveDate>) -> Result<Self, TemporalError> {
        if let Some(to) = to {
            if from > to {
                return Err(TemporalError::InvalidPeriod {
                    start: from.to_string(),
                    end: to.to_string(),
                });
            }
        }
        Ok(Self { from, to })
    }

    /// Creates an open-ended window starting on the given date
    pub fn open_from(from: NaiveDate) -> Self {
        Self { from, to: None }
    }

    /// Returns true if the window covers the given date
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && self.to.map_or(true, |to| date <= to)
    }

    /// Returns true if this window shares at least one day with another
    pub fn overlaps(&self, other: &ValidityWindow) -> bool {
        let self_to = self.to.unwrap_or(NaiveDate::MAX);
        let other_to = other.to.unwrap_or(NaiveDate::MAX);

        self.from <= other_to && other.from <= self_to
    }

    /// Returns true if the window has no end date
    pub fn is_open_ended(&self) -> bool {
        self.to.is_none()
    }
}

/// An inclusive span of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Creates a range covering a single day
    pub fn single_day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// The calendar month containing `date`
    pub fn month_of(date: NaiveDate) -> Result<Self, TemporalError> {
        let start = date
            .with_day(1)
            .ok_or_else(|| TemporalError::OutOfRange(date.to_string()))?;
        let next_month = if date.month() == 12 {
            NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
        };
        let end = next_month
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| TemporalError::OutOfRange(date.to_string()))?;
        Ok(Self { start, end })
    }

    /// The `days` days ending on (and including) `end`
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self, TemporalError> {
        let span = days.saturating_sub(1);
        let start = end
            .checked_sub_days(Days::new(u64::from(span)))
            .ok_or_else(|| TemporalError::OutOfRange(end.to_string()))?;
        Ok(Self { start, end })
    }

    /// Returns a copy of this range with its end moved back to `end` if earlier
    pub fn truncate_to(&self, end: NaiveDate) -> Self {
        Self {
            start: self.start,
            end: self.end.min(end).max(self.start),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days in the range, both ends counted
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validity_window_inclusive_bounds() {
        let window = ValidityWindow::new(date(2024, 6, 1), Some(date(2026, 5, 31))).unwrap();
        assert!(window.contains(date(2024, 6, 1)));
        assert!(window.contains(date(2026, 5, 31)));
        assert!(!window.contains(date(2026, 6, 1)));
    }

    #[test]
    fn test_month_of_december() {
        let month = DateRange::month_of(date(2024, 12, 15)).unwrap();
        assert_eq!(month.start, date(2024, 12, 1));
        assert_eq!(month.end, date(2024, 12, 31));
    }

    #[test]
    fn test_trailing_fourteen_days() {
        let window = DateRange::trailing(date(2024, 3, 14), 14).unwrap();
        assert_eq!(window.start, date(2024, 3, 1));
        assert_eq!(window.days(), 14);
    }

    #[test]
    fn test_local_time_in_tokyo() {
        let tz = Timezone::new(chrono_tz::Asia::Tokyo);
        let utc = Utc.with_ymd_and_hms(2024, 4, 1, 14, 10, 0).unwrap();
        assert_eq!(tz.local_time(utc), NaiveTime::from_hms_opt(23, 10, 0).unwrap());
    }
}
