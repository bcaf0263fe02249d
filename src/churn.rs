// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily issue churn: issues opened and closed per day, by priority.

use crate::aggregate::{self, AggregationTable};
use crate::classify::{self, ChurnKey, Priority};
use crate::dates::DateRange;
use crate::db::{Column, ColumnType, Row, TableSchema, Value};
use crate::github::Issue;
use anyhow::Result;

pub static ISSUE_CHURN_TABLE: TableSchema = TableSchema {
    name: "issue_churn",
    columns: &[
        Column {
            name: "date",
            ty: ColumnType::Date,
            nullable: false,
        },
        Column {
            name: "state",
            ty: ColumnType::Varchar(11),
            nullable: false,
        },
        Column {
            name: "priority",
            ty: ColumnType::Int,
            nullable: true,
        },
        Column {
            name: "bugtotal",
            ty: ColumnType::Int,
            nullable: false,
        },
    ],
};

fn events(issue: &Issue) -> Vec<(chrono::NaiveDate, ChurnKey)> {
    let priority = Priority::from_labels(issue.label_names());
    classify::churn_events(
        issue.created_at.date_naive(),
        issue.closed_at.map(|closed| closed.date_naive()),
        priority,
    )
}

/// Count opened and closed issues per day over the span of days the issues
/// touch. Returns `None` when there are no issues at all.
pub fn collect(issues: &[Issue]) -> Result<Option<AggregationTable<ChurnKey>>> {
    let days = issues.iter().flat_map(events).map(|(date, _)| date);
    let (Some(first), Some(last)) = (days.clone().min(), days.max()) else {
        return Ok(None);
    };

    let range = DateRange::inclusive(first, last)?;
    tracing::info!(issues = issues.len(), %range, "aggregating issue churn");

    Ok(Some(aggregate::aggregate(range, issues, |issue| events(issue))))
}

/// Rows for the churn table: per day and priority, the opened row followed by
/// the closed row.
pub fn to_rows(table: &AggregationTable<ChurnKey>) -> Vec<Row> {
    table
        .rows()
        .map(|(date, key, total)| {
            vec![
                Value::Date(date),
                Value::Text(key.state.label().to_string()),
                key.priority.level().map_or(Value::Null, Value::Int),
                Value::Int(total as i64),
            ]
        })
        .collect()
}
