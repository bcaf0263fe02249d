// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar day ranges and day bucketing.

use crate::error::StatsError;
use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDate, TimeZone};
use std::fmt;

/// A half-open range of calendar days, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, StatsError> {
        if start > end {
            return Err(StatsError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The range covering `first` through `last`, both inclusive.
    pub fn inclusive(first: NaiveDate, last: NaiveDate) -> Result<Self, StatsError> {
        let end = last
            .checked_add_days(Days::new(1))
            .ok_or(StatsError::InvalidDateRange {
                start: first,
                end: last,
            })?;
        Self::new(first, end)
    }

    /// The single day before `today`, which is what a scheduled run reports on.
    pub fn yesterday(today: NaiveDate) -> Self {
        let start = today.pred_opt().unwrap_or(today);
        Self { start, end: today }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of whole days in the range.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }

    /// Split into two halves at the midpoint. Ranges shorter than two days
    /// cannot be split.
    pub fn bisect(&self) -> Option<(Self, Self)> {
        let days = self.num_days();
        if days < 2 {
            return None;
        }
        let mid = self.start + chrono::Duration::days((days / 2) as i64);
        Some((
            Self {
                start: self.start,
                end: mid,
            },
            Self {
                start: mid,
                end: self.end,
            },
        ))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parse a date in YYYY-MM-DD format.
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("failed to parse date '{}'", date_str))
}

/// The instant at which `date` begins on the wall clock of `tz`.
///
/// If midnight is skipped by a DST transition the earliest valid instant of
/// the day is used.
pub fn day_start<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<DateTime<Tz>> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            let one_am = midnight + chrono::Duration::hours(1);
            tz.from_local_datetime(&one_am).earliest()
        })
        .with_context(|| format!("no local midnight exists for {}", date))
}

/// The calendar day on the wall clock of `tz` that contains the given epoch
/// second.
pub fn bucket_day<Tz: TimeZone>(epoch_secs: i64, tz: &Tz) -> Result<NaiveDate, StatsError> {
    tz.timestamp_opt(epoch_secs, 0)
        .single()
        .map(|dt| dt.date_naive())
        .ok_or(StatsError::InvalidTimestamp { ts: epoch_secs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_days() {
        let range = DateRange::new(date(2024, 1, 30), date(2024, 2, 2)).unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days, vec![date(2024, 1, 30), date(2024, 1, 31), date(2024, 2, 1)]);
        assert_eq!(range.num_days(), 3);
        assert!(range.contains(date(2024, 2, 1)));
        assert!(!range.contains(date(2024, 2, 2)));
        assert!(!range.contains(date(2024, 1, 29)));
    }

    #[test]
    fn test_empty_range() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 1)).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.days().count(), 0);
    }

    #[test]
    fn test_reversed_range_rejected() {
        let err = DateRange::new(date(2024, 1, 2), date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, StatsError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_inclusive_and_yesterday() {
        let range = DateRange::inclusive(date(2024, 2, 1), date(2024, 2, 1)).unwrap();
        assert_eq!(range.num_days(), 1);

        let range = DateRange::yesterday(date(2024, 3, 1));
        assert_eq!(range.start(), date(2024, 2, 29));
        assert_eq!(range.end(), date(2024, 3, 1));
    }

    #[test]
    fn test_bisect() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 6)).unwrap();
        let (a, b) = range.bisect().unwrap();
        assert_eq!(a, DateRange::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap());
        assert_eq!(b, DateRange::new(date(2024, 1, 3), date(2024, 1, 6)).unwrap());

        let single = DateRange::inclusive(date(2024, 1, 1), date(2024, 1, 1)).unwrap();
        assert!(single.bisect().is_none());
    }

    #[test]
    fn test_bucket_day_uses_local_wall_clock() {
        // 2024-01-01T23:30:00-05:00 is already 2024-01-02 in UTC.
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let instant = tz.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        assert_eq!(bucket_day(instant.timestamp(), &tz).unwrap(), date(2024, 1, 1));
        assert_eq!(bucket_day(instant.timestamp(), &Utc).unwrap(), date(2024, 1, 2));
    }

    #[test]
    fn test_day_start() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = day_start(date(2024, 1, 2), &tz).unwrap();
        assert_eq!(start.timestamp(), 1_704_146_400);
        assert_eq!(bucket_day(start.timestamp(), &tz).unwrap(), date(2024, 1, 2));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-11-19").unwrap(), date(2025, 11, 19));
        assert!(parse_date("19/11/2025").is_err());
    }
}
