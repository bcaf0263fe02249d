// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read queries against a Synapse homeserver database.

use crate::error::StatsError;
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection as _, Row as _};

/// A user created within the queried window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignupRecord {
    pub user_id: String,
    /// Seconds since the Unix epoch.
    pub creation_ts: i64,
}

/// The homeserver tables signups are derived from.
#[allow(async_fn_in_trait)]
pub trait SignupSource {
    /// Users with a password created in `[start, end)`, as epoch seconds.
    async fn users_created_between(&mut self, start: i64, end: i64) -> Result<Vec<SignupRecord>>;

    /// The earliest user agent the user connected with on the day starting
    /// at `day_start_ms` (epoch milliseconds).
    async fn creation_user_agent(
        &mut self,
        user_id: &str,
        day_start_ms: i64,
    ) -> Result<Option<String>>;
}

/// Connection settings for the homeserver's Postgres database.
#[derive(Clone, Debug)]
pub struct SynapseDb {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

const USERS_CREATED_BETWEEN: &str = r#"
SELECT name, creation_ts
FROM users
WHERE creation_ts >= $1
AND creation_ts < $2
AND password_hash != ''
"#;

const CREATION_USER_AGENT: &str = r#"
SELECT user_agent
FROM user_daily_visits udv
JOIN user_ips uip
ON udv.user_id = uip.user_id
AND udv.device_id = uip.device_id
WHERE udv.user_id = $1
AND udv.timestamp = $2
AND uip.ip != '-'
ORDER BY uip.last_seen ASC
LIMIT 1
"#;

pub struct PostgresSynapse {
    conn: PgConnection,
}

impl PostgresSynapse {
    pub async fn connect(db: &SynapseDb) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .database(&db.name)
            .username(&db.user)
            .password(&db.password)
            .options([("search_path", "matrix")]);

        let conn = PgConnection::connect_with(&options).await.map_err(|e| {
            StatsError::connection(
                format!("Synapse database {} at {}:{}", db.name, db.host, db.port),
                e,
            )
        })?;
        Ok(Self { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .context("failed to close Synapse connection")
    }
}

impl SignupSource for PostgresSynapse {
    async fn users_created_between(
        &mut self,
        start: i64,
        end: i64,
    ) -> Result<Vec<SignupRecord>> {
        let rows = sqlx::query(USERS_CREATED_BETWEEN)
            .bind(start)
            .bind(end)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| StatsError::query("list users created in range", e))?;

        rows.iter()
            .map(|row| {
                Ok(SignupRecord {
                    user_id: row.try_get("name")?,
                    creation_ts: row.try_get("creation_ts")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .context("failed to decode users row")
    }

    async fn creation_user_agent(
        &mut self,
        user_id: &str,
        day_start_ms: i64,
    ) -> Result<Option<String>> {
        let row = sqlx::query(CREATION_USER_AGENT)
            .bind(user_id)
            .bind(day_start_ms)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| StatsError::query(format!("look up user agent for {}", user_id), e))?;

        match row {
            Some(row) => row
                .try_get::<Option<String>, _>("user_agent")
                .context("failed to decode user agent"),
            None => Ok(None),
        }
    }
}
