// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily signups by client platform.

use crate::aggregate::{self, AggregationTable};
use crate::classify::Platform;
use crate::dates::{self, DateRange};
use crate::db::{Column, ColumnType, Row, TableSchema, Value};
use crate::synapse::SignupSource;
use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};

pub static SIGNUPS_TABLE: TableSchema = TableSchema {
    name: "riot_signups_by_platform",
    columns: &[
        Column {
            name: "date",
            ty: ColumnType::Date,
            nullable: false,
        },
        Column {
            name: "platform",
            ty: ColumnType::Varchar(12),
            nullable: false,
        },
        Column {
            name: "total",
            ty: ColumnType::Int,
            nullable: true,
        },
    ],
};

/// Count the signups created in `range`, bucketed by the day they happened
/// on in `tz` and classified by the user agent they first connected with.
pub async fn collect<S, Tz>(
    source: &mut S,
    range: DateRange,
    tz: &Tz,
) -> Result<AggregationTable<Platform>>
where
    S: SignupSource,
    Tz: TimeZone,
{
    let start = dates::day_start(range.start(), tz)?.timestamp();
    let end = dates::day_start(range.end(), tz)?.timestamp();

    let users = source
        .users_created_between(start, end)
        .await
        .with_context(|| format!("failed to list users created in {}", range))?;
    tracing::info!(users = users.len(), %range, "found new users");

    let mut classified: Vec<(NaiveDate, Platform)> = Vec::with_capacity(users.len());
    for (index, user) in users.iter().enumerate() {
        let day = dates::bucket_day(user.creation_ts, tz)?;
        let day_start_ms = dates::day_start(day, tz)?.timestamp() * 1000;
        let user_agent = source
            .creation_user_agent(&user.user_id, day_start_ms)
            .await
            .with_context(|| format!("failed to look up user agent for {}", user.user_id))?;
        let platform = Platform::from_user_agent(user_agent.as_deref());
        tracing::debug!(
            user = %user.user_id,
            %day,
            ?platform,
            progress = format_args!("{}/{}", index + 1, users.len()),
            "classified signup"
        );
        classified.push((day, platform));
    }

    Ok(aggregate::aggregate(range, classified, |event| Some(*event)))
}

/// Rows for the signups table, one per day and platform.
pub fn to_rows(table: &AggregationTable<Platform>) -> Vec<Row> {
    table
        .rows()
        .map(|(date, platform, total)| {
            vec![
                Value::Date(date),
                Value::Text(platform.label().to_string()),
                Value::Int(total as i64),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Category;
    use crate::synapse::SignupRecord;
    use chrono::{DateTime, FixedOffset};
    use std::collections::HashMap;

    /// An in-memory homeserver: users plus the agent each connected with on a
    /// given day.
    #[derive(Default)]
    struct FakeSynapse {
        users: Vec<SignupRecord>,
        agents: HashMap<(String, i64), String>,
        lookups: Vec<(String, i64)>,
    }

    impl SignupSource for FakeSynapse {
        async fn users_created_between(
            &mut self,
            start: i64,
            end: i64,
        ) -> Result<Vec<SignupRecord>> {
            Ok(self
                .users
                .iter()
                .filter(|u| u.creation_ts >= start && u.creation_ts < end)
                .cloned()
                .collect())
        }

        async fn creation_user_agent(
            &mut self,
            user_id: &str,
            day_start_ms: i64,
        ) -> Result<Option<String>> {
            self.lookups.push((user_id.to_string(), day_start_ms));
            Ok(self.agents.get(&(user_id.to_string(), day_start_ms)).cloned())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tz() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn add_user(
        fake: &mut FakeSynapse,
        id: &str,
        created: DateTime<FixedOffset>,
        ua: Option<&str>,
    ) {
        fake.users.push(SignupRecord {
            user_id: id.to_string(),
            creation_ts: created.timestamp(),
        });
        if let Some(ua) = ua {
            let day_ms = dates::day_start(created.date_naive(), &tz())
                .unwrap()
                .timestamp()
                * 1000;
            fake.agents.insert((id.to_string(), day_ms), ua.to_string());
        }
    }

    #[tokio::test]
    async fn test_signups_bucketed_by_local_day() {
        let mut fake = FakeSynapse::default();
        add_user(&mut fake, "@a:example.org", local(2024, 1, 1, 23, 30), Some("Mozilla iPhone"));
        add_user(&mut fake, "@b:example.org", local(2024, 1, 2, 1, 0), Some("Android Webkit"));

        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        let table = collect(&mut fake, range, &tz()).await.unwrap();

        assert_eq!(table.len(), 2 * 4);
        let expect = |d: NaiveDate, ios, android| {
            assert_eq!(table.get(d, Platform::Ios), Some(ios));
            assert_eq!(table.get(d, Platform::Android), Some(android));
            assert_eq!(table.get(d, Platform::WebElectron), Some(0));
            assert_eq!(table.get(d, Platform::Unknown), Some(0));
        };
        expect(date(2024, 1, 1), 1, 0);
        expect(date(2024, 1, 2), 0, 1);
    }

    #[tokio::test]
    async fn test_user_agent_looked_up_for_creation_day() {
        let mut fake = FakeSynapse::default();
        add_user(&mut fake, "@a:example.org", local(2024, 1, 1, 23, 30), None);

        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        let table = collect(&mut fake, range, &tz()).await.unwrap();

        let day_ms = dates::day_start(date(2024, 1, 1), &tz()).unwrap().timestamp() * 1000;
        assert_eq!(fake.lookups, vec![("@a:example.org".to_string(), day_ms)]);
        assert_eq!(table.get(date(2024, 1, 1), Platform::Unknown), Some(1));
    }

    #[tokio::test]
    async fn test_users_outside_range_are_ignored() {
        let mut fake = FakeSynapse::default();
        add_user(&mut fake, "@early:example.org", local(2023, 12, 31, 23, 59), Some("iPhone"));
        add_user(&mut fake, "@in:example.org", local(2024, 1, 1, 0, 0), Some("Electron"));
        add_user(&mut fake, "@late:example.org", local(2024, 1, 2, 0, 0), Some("Android"));

        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        let table = collect(&mut fake, range, &tz()).await.unwrap();

        assert_eq!(table.day_total(date(2024, 1, 1)), 1);
        assert_eq!(table.get(date(2024, 1, 1), Platform::WebElectron), Some(1));
        assert_eq!(table.skipped(), 0);
    }

    #[tokio::test]
    async fn test_quiet_range_reports_zeroes() {
        let mut fake = FakeSynapse::default();
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 8)).unwrap();
        let table = collect(&mut fake, range, &tz()).await.unwrap();

        let rows = to_rows(&table);
        assert_eq!(rows.len(), 7 * Platform::all().len());
        assert!(rows.iter().all(|row| row[2] == Value::Int(0)));
    }

    #[test]
    fn test_to_rows_labels() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).unwrap();
        let mut table = AggregationTable::<Platform>::new(range);
        table.increment(date(2024, 1, 1), Platform::Unknown).unwrap();

        let rows = to_rows(&table);
        assert_eq!(
            rows,
            vec![
                vec![Value::Date(date(2024, 1, 1)), Value::Text("IOS".into()), Value::Int(0)],
                vec![Value::Date(date(2024, 1, 1)), Value::Text("ANDROID".into()), Value::Int(0)],
                vec![
                    Value::Date(date(2024, 1, 1)),
                    Value::Text("WEB/ELECTRON".into()),
                    Value::Int(0)
                ],
                vec![Value::Date(date(2024, 1, 1)), Value::Text("None".into()), Value::Int(1)],
            ]
        );
    }
}
