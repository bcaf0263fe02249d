// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by both reporting jobs.

use crate::dates::DateRange;
use chrono::NaiveDate;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("missing required configuration value `{key}`")]
    ConfigurationMissing { key: &'static str },

    #[error("failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("date {date} falls outside the aggregation range {range}")]
    ClassificationOutOfRange { date: NaiveDate, range: DateRange },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("timestamp {ts} cannot be represented in the local time zone")]
    InvalidTimestamp { ts: i64 },
}

impl StatsError {
    pub fn connection(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn query(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            context: context.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StatsError::ConfigurationMissing {
            key: "github_token",
        };
        assert_eq!(
            err.to_string(),
            "missing required configuration value `github_token`"
        );

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        )
        .unwrap();
        let err = StatsError::ClassificationOutOfRange {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            range,
        };
        assert_eq!(
            err.to_string(),
            "date 2024-01-05 falls outside the aggregation range [2024-01-01, 2024-01-03)"
        );
    }

    #[test]
    fn test_query_error_keeps_source() {
        let io = std::io::Error::other("boom");
        let err = StatsError::query("list users", io);
        assert_eq!(err.to_string(), "query failed: list users");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "boom");
    }
}
