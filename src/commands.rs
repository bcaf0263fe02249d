// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use crate::churn::{self, ISSUE_CHURN_TABLE};
use crate::config::Config;
use crate::dates::DateRange;
use crate::db::{MetricsStore, ReplaceScope, Row, Store, StoreTarget, TableSchema};
use crate::github::GithubClient;
use crate::query::{self, OutputFormat};
use crate::signups::{self, SIGNUPS_TABLE};
use crate::synapse::PostgresSynapse;
use anyhow::{Context, Result};
use chrono::{Local, Utc};

/// Run the signups command.
///
/// `target` is `None` for a dry run, which logs the rows instead of writing
/// them.
pub async fn run_signups(
    config: &Config,
    range: DateRange,
    target: Option<&StoreTarget>,
) -> Result<()> {
    let db = config.synapse_db()?;
    tracing::info!(host = %db.host, database = %db.name, %range, "collecting signups");

    let mut source = PostgresSynapse::connect(&db)
        .await
        .context("failed to connect to the Synapse database")?;
    let collected = signups::collect(&mut source, range, &Local).await;
    let closed = source.close().await;
    let table = collected?;
    closed?;

    for day in range.days() {
        tracing::info!(%day, signups = table.day_total(day), "daily total");
    }

    let rows = signups::to_rows(&table);
    write_rows(target, &SIGNUPS_TABLE, ReplaceScope::Dates(range), &rows).await
}

/// Run the issue churn command.
pub async fn run_issue_churn(config: &Config, target: Option<&StoreTarget>) -> Result<()> {
    let client = GithubClient::new(config.github_token()?);
    let query = config.issue_query();

    let tomorrow = Utc::now()
        .date_naive()
        .succ_opt()
        .context("current date is out of range")?;
    let window = DateRange::new(config.issue_churn.since, tomorrow)?;

    tracing::info!(repo = %query.repo, label = %query.label, %window, "searching issues");
    let issues = client
        .search_issues(&query, window)
        .await
        .context("failed to fetch issues from GitHub")?;
    tracing::info!(issues = issues.len(), "fetched issues");

    let Some(table) = churn::collect(&issues)? else {
        tracing::warn!("no issues matched, leaving {} untouched", ISSUE_CHURN_TABLE.name);
        return Ok(());
    };

    // The churn table is recomputed from the full issue history each run.
    let rows = churn::to_rows(&table);
    write_rows(target, &ISSUE_CHURN_TABLE, ReplaceScope::All, &rows).await
}

/// Print the rows stored in `schema` for `range`.
pub async fn run_query(
    target: &StoreTarget,
    schema: &TableSchema,
    range: DateRange,
    format: OutputFormat,
) -> Result<()> {
    let mut store = Store::open(target).await?;
    let fetched = store.fetch(schema, range).await;
    let closed = store.close().await;
    let rows = fetched?;
    closed?;

    if rows.is_empty() && format == OutputFormat::Table {
        println!("No rows in {} for {}", schema.name, range);
        return Ok(());
    }
    print!("{}", query::render(schema, &rows, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}

async fn write_rows(
    target: Option<&StoreTarget>,
    schema: &TableSchema,
    scope: ReplaceScope,
    rows: &[Row],
) -> Result<()> {
    let Some(target) = target else {
        for row in rows {
            tracing::info!(table = schema.name, ?row, "dry run, not writing");
        }
        return Ok(());
    };

    let mut store = Store::open(target).await?;
    let written = async {
        store.ensure_table(schema).await?;
        store.replace(schema, scope, rows).await
    }
    .await;
    let closed = store.close().await;
    let inserted = written.with_context(|| format!("failed to write {}", schema.name))?;
    closed?;

    tracing::info!(table = schema.name, rows = inserted, "replaced rows");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use chrono::NaiveDate;

    fn temp_db(name: &str) -> camino::Utf8PathBuf {
        let dir = camino::Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap();
        let path = dir.join(format!("riot-stats-{}-{}.db", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_write_rows_to_sqlite_file() {
        let path = temp_db("write");
        let target = StoreTarget::Sqlite(path.clone());
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let range = DateRange::inclusive(day, day).unwrap();
        let rows = vec![vec![
            Value::Date(day),
            Value::Text("IOS".into()),
            Value::Int(3),
        ]];

        write_rows(Some(&target), &SIGNUPS_TABLE, ReplaceScope::Dates(range), &rows)
            .await
            .unwrap();
        write_rows(Some(&target), &SIGNUPS_TABLE, ReplaceScope::Dates(range), &rows)
            .await
            .unwrap();

        let mut store = Store::open(&target).await.unwrap();
        let stored = store.fetch(&SIGNUPS_TABLE, range).await.unwrap();
        store.close().await.unwrap();
        assert_eq!(stored, rows);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = vec![vec![Value::Date(day), Value::Text("IOS".into()), Value::Int(3)]];
        write_rows(None, &SIGNUPS_TABLE, ReplaceScope::All, &rows)
            .await
            .unwrap();
    }
}
