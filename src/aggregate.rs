// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily aggregation of classified records.

use crate::dates::DateRange;
use crate::error::StatsError;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A fixed, enumerable set of labels that records are counted under.
pub trait Category: Copy + Ord + Debug {
    /// Every value of the category, in reporting order.
    fn all() -> Vec<Self>;
}

/// Per-day, per-category counts over a fixed date range.
///
/// Every `(date, category)` cell of the range is present from construction
/// on, so quiet days are reported as explicit zeroes.
#[derive(Debug, Clone)]
pub struct AggregationTable<C: Category> {
    range: DateRange,
    counts: BTreeMap<(NaiveDate, C), u64>,
    skipped: usize,
}

impl<C: Category> AggregationTable<C> {
    /// Create a table with a zero count for every day and category.
    pub fn new(range: DateRange) -> Self {
        let categories = C::all();
        let counts = range
            .days()
            .flat_map(|date| categories.iter().map(move |c| ((date, *c), 0)))
            .collect();
        Self {
            range,
            counts,
            skipped: 0,
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Add one to the cell for `date` and `category`.
    pub fn increment(&mut self, date: NaiveDate, category: C) -> Result<(), StatsError> {
        match self.counts.get_mut(&(date, category)) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(StatsError::ClassificationOutOfRange {
                date,
                range: self.range,
            }),
        }
    }

    pub fn get(&self, date: NaiveDate, category: C) -> Option<u64> {
        self.counts.get(&(date, category)).copied()
    }

    /// Sum of all categories for one day.
    pub fn day_total(&self, date: NaiveDate) -> u64 {
        self.counts
            .iter()
            .filter(|((d, _), _)| *d == date)
            .map(|(_, count)| count)
            .sum()
    }

    /// All cells in date, then category, order.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, C, u64)> + '_ {
        self.counts
            .iter()
            .map(|((date, category), count)| (*date, *category, *count))
    }

    /// Number of cells, which is always `days x categories`.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of events dropped because their day fell outside the range.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Count classified events from `records` into a fresh table over `range`.
///
/// The classifier yields zero or more `(day, category)` events per record.
/// Events outside the range are logged and skipped.
pub fn aggregate<R, C, I, F>(range: DateRange, records: R, mut classify: F) -> AggregationTable<C>
where
    R: IntoIterator,
    C: Category,
    I: IntoIterator<Item = (NaiveDate, C)>,
    F: FnMut(&R::Item) -> I,
{
    let mut table = AggregationTable::new(range);

    for record in records {
        for (date, category) in classify(&record) {
            if let Err(err) = table.increment(date, category) {
                tracing::warn!(?category, "skipping event: {}", err);
                table.skipped += 1;
            }
        }
    }

    table
}
