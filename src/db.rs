// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destination metrics store: table provisioning and idempotent replacement.

use crate::dates::DateRange;
use crate::error::StatsError;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use rusqlite::{Connection, params_from_iter};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Connection as _, Row as _};

/// A single column value written to or read from a metrics table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Date(NaiveDate),
    Text(String),
    Int(i64),
    Null,
}

pub type Row = Vec<Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Date,
    Varchar(u16),
    Int,
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

/// A flat metrics table. The first column is always `date`.
#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let ty = match c.ty {
                    ColumnType::Date => "DATE".to_string(),
                    ColumnType::Varchar(n) => format!("VARCHAR({})", n),
                    ColumnType::Int => "INT".to_string(),
                };
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("    {} {}{}", c.name, ty, null)
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            columns.join(",\n")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders
        )
    }

    fn select_sql(&self, days: usize) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        format!(
            "SELECT {} FROM {} WHERE date IN ({}) ORDER BY {}",
            names.join(", "),
            self.name,
            vec!["?"; days].join(", "),
            names[..names.len() - 1].join(", ")
        )
    }
}

/// Which existing rows a replacement removes before inserting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceScope {
    /// Rows whose date is one of the days in the range.
    Dates(DateRange),
    /// Every row in the table.
    All,
}

impl ReplaceScope {
    /// The delete statement, or `None` when the scope covers no rows.
    /// An empty `IN ()` list is a syntax error on MySQL.
    fn delete_sql(&self, table: &str) -> Option<String> {
        match self {
            ReplaceScope::Dates(range) if range.is_empty() => None,
            ReplaceScope::Dates(range) => Some(format!(
                "DELETE FROM {} WHERE date IN ({})",
                table,
                vec!["?"; range.num_days()].join(", ")
            )),
            ReplaceScope::All => Some(format!("DELETE FROM {}", table)),
        }
    }

    fn dates(&self) -> Vec<NaiveDate> {
        match self {
            ReplaceScope::Dates(range) => range.days().collect(),
            ReplaceScope::All => Vec::new(),
        }
    }
}

/// A store that metrics tables are written to.
#[allow(async_fn_in_trait)]
pub trait MetricsStore {
    /// Create the table if it does not exist yet. Never fails or warns when
    /// it already does.
    async fn ensure_table(&mut self, schema: &TableSchema) -> Result<()>;

    /// Delete the rows covered by `scope` and insert `rows`, all in one
    /// transaction. Returns the number of rows inserted.
    async fn replace(
        &mut self,
        schema: &TableSchema,
        scope: ReplaceScope,
        rows: &[Row],
    ) -> Result<usize>;

    /// Read back the rows stored for every day of `range`.
    async fn fetch(&mut self, schema: &TableSchema, range: DateRange) -> Result<Vec<Row>>;
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value as SqlValue};
        Ok(match self {
            Value::Date(d) => ToSqlOutput::Owned(SqlValue::Text(d.to_string())),
            Value::Text(s) => ToSqlOutput::Borrowed(s.as_str().into()),
            Value::Int(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
        })
    }
}

/// Metrics tables in a local SQLite file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        let conn = Connection::open(path.as_std_path())
            .map_err(|e| StatsError::connection(format!("SQLite database at {}", path), e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StatsError::connection("in-memory SQLite database", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // journal_mode persists in the file; the rest are per-connection.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .context("failed to set database pragmas")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn read_row(row: &rusqlite::Row<'_>, schema: &TableSchema) -> rusqlite::Result<Row> {
        schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = match column.ty {
                    ColumnType::Date => {
                        let s: String = row.get(i)?;
                        let date = NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                i,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?;
                        Value::Date(date)
                    }
                    ColumnType::Varchar(_) => match row.get::<_, Option<String>>(i)? {
                        Some(s) => Value::Text(s),
                        None => Value::Null,
                    },
                    ColumnType::Int => match row.get::<_, Option<i64>>(i)? {
                        Some(n) => Value::Int(n),
                        None => Value::Null,
                    },
                };
                Ok(value)
            })
            .collect()
    }
}

impl MetricsStore for SqliteStore {
    async fn ensure_table(&mut self, schema: &TableSchema) -> Result<()> {
        self.conn
            .execute_batch(&schema.create_sql())
            .map_err(|e| StatsError::query(format!("create table {}", schema.name), e))?;
        Ok(())
    }

    async fn replace(
        &mut self,
        schema: &TableSchema,
        scope: ReplaceScope,
        rows: &[Row],
    ) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to begin transaction")?;

        if let Some(delete_sql) = scope.delete_sql(schema.name) {
            let dates: Vec<String> = scope.dates().iter().map(|d| d.to_string()).collect();
            let deleted = tx
                .execute(&delete_sql, params_from_iter(dates.iter()))
                .map_err(|e| StatsError::query(format!("delete from {}", schema.name), e))?;
            tracing::debug!(table = schema.name, deleted, "deleted existing rows");
        }

        {
            let mut stmt = tx
                .prepare(&schema.insert_sql())
                .map_err(|e| StatsError::query(format!("prepare insert into {}", schema.name), e))?;
            for row in rows {
                tracing::debug!(table = schema.name, ?row, "inserting row");
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| StatsError::query(format!("insert into {}", schema.name), e))?;
            }
        }

        tx.commit().context("failed to commit transaction")?;
        Ok(rows.len())
    }

    async fn fetch(&mut self, schema: &TableSchema, range: DateRange) -> Result<Vec<Row>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let dates: Vec<String> = range.days().map(|d| d.to_string()).collect();
        let mut stmt = self
            .conn
            .prepare(&schema.select_sql(dates.len()))
            .map_err(|e| StatsError::query(format!("select from {}", schema.name), e))?;
        let rows = stmt
            .query_map(params_from_iter(dates.iter()), |row| {
                Self::read_row(row, schema)
            })
            .map_err(|e| StatsError::query(format!("select from {}", schema.name), e))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.with_context(|| format!("failed to read row from {}", schema.name))?);
        }
        Ok(out)
    }
}

/// Connection settings for the MySQL metrics database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MySqlTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    pub password: String,
}

/// Metrics tables in a MySQL database.
pub struct MySqlStore {
    conn: MySqlConnection,
}

impl MySqlStore {
    pub async fn connect(target: &MySqlTarget) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.user)
            .password(&target.password)
            .database(&target.database);

        let conn = MySqlConnection::connect_with(&options).await.map_err(|e| {
            StatsError::connection(
                format!(
                    "MySQL database {} at {}:{}",
                    target.database, target.host, target.port
                ),
                e,
            )
        })?;
        Ok(Self { conn })
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .context("failed to close MySQL connection")
    }

    fn read_row(row: &MySqlRow, schema: &TableSchema) -> Result<Row, sqlx::Error> {
        schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = match column.ty {
                    ColumnType::Date => Value::Date(row.try_get::<NaiveDate, _>(i)?),
                    ColumnType::Varchar(_) => row
                        .try_get::<Option<String>, _>(i)?
                        .map_or(Value::Null, Value::Text),
                    ColumnType::Int => row
                        .try_get::<Option<i32>, _>(i)?
                        .map_or(Value::Null, |n| Value::Int(n.into())),
                };
                Ok(value)
            })
            .collect()
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        Value::Date(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::Int(n) => query.bind(*n),
        Value::Null => query.bind(None::<i64>),
    }
}

impl MetricsStore for MySqlStore {
    async fn ensure_table(&mut self, schema: &TableSchema) -> Result<()> {
        let context = format!("create table {}", schema.name);
        // Suppress the "table already exists" note for this session only.
        sqlx::raw_sql("SET sql_notes = 0")
            .execute(&mut self.conn)
            .await
            .map_err(|e| StatsError::query(context.clone(), e))?;
        let created = sqlx::raw_sql(&schema.create_sql())
            .execute(&mut self.conn)
            .await
            .map_err(|e| StatsError::query(context.clone(), e));
        sqlx::raw_sql("SET sql_notes = 1")
            .execute(&mut self.conn)
            .await
            .map_err(|e| StatsError::query(context, e))?;
        created?;
        Ok(())
    }

    async fn replace(
        &mut self,
        schema: &TableSchema,
        scope: ReplaceScope,
        rows: &[Row],
    ) -> Result<usize> {
        let mut tx = self
            .conn
            .begin()
            .await
            .context("failed to begin transaction")?;

        if let Some(delete_sql) = scope.delete_sql(schema.name) {
            let delete = scope
                .dates()
                .into_iter()
                .fold(sqlx::query(&delete_sql), |query, date| query.bind(date));
            let deleted = delete
                .execute(&mut *tx)
                .await
                .map_err(|e| StatsError::query(format!("delete from {}", schema.name), e))?
                .rows_affected();
            tracing::debug!(table = schema.name, deleted, "deleted existing rows");
        }

        let insert_sql = schema.insert_sql();
        for row in rows {
            tracing::debug!(table = schema.name, ?row, "inserting row");
            let query = row
                .iter()
                .fold(sqlx::query(&insert_sql), bind_value);
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| StatsError::query(format!("insert into {}", schema.name), e))?;
        }

        tx.commit().await.context("failed to commit transaction")?;
        Ok(rows.len())
    }

    async fn fetch(&mut self, schema: &TableSchema, range: DateRange) -> Result<Vec<Row>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let sql = schema.select_sql(range.num_days());
        let query = range
            .days()
            .fold(sqlx::query(&sql), |query, date| query.bind(date));
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| StatsError::query(format!("select from {}", schema.name), e))?;

        rows.iter()
            .map(|row| {
                Self::read_row(row, schema)
                    .with_context(|| format!("failed to read row from {}", schema.name))
            })
            .collect()
    }
}

/// Where the metrics tables live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreTarget {
    Sqlite(Utf8PathBuf),
    MySql(MySqlTarget),
}

/// The configured destination, whichever backend it is.
pub enum Store {
    Sqlite(SqliteStore),
    MySql(MySqlStore),
}

impl Store {
    pub async fn open(target: &StoreTarget) -> Result<Self> {
        match target {
            StoreTarget::Sqlite(path) => {
                tracing::info!(%path, "opening SQLite metrics database");
                Ok(Store::Sqlite(SqliteStore::open(path)?))
            }
            StoreTarget::MySql(target) => {
                tracing::info!(
                    host = %target.host,
                    database = %target.database,
                    "connecting to MySQL metrics database"
                );
                Ok(Store::MySql(MySqlStore::connect(target).await?))
            }
        }
    }

    /// Release the underlying connection.
    pub async fn close(self) -> Result<()> {
        match self {
            Store::Sqlite(store) => {
                store
                    .conn
                    .close()
                    .map_err(|(_, e)| e)
                    .context("failed to close SQLite database")?;
                Ok(())
            }
            Store::MySql(store) => store.close().await,
        }
    }
}

impl MetricsStore for Store {
    async fn ensure_table(&mut self, schema: &TableSchema) -> Result<()> {
        match self {
            Store::Sqlite(store) => store.ensure_table(schema).await,
            Store::MySql(store) => store.ensure_table(schema).await,
        }
    }

    async fn replace(
        &mut self,
        schema: &TableSchema,
        scope: ReplaceScope,
        rows: &[Row],
    ) -> Result<usize> {
        match self {
            Store::Sqlite(store) => store.replace(schema, scope, rows).await,
            Store::MySql(store) => store.replace(schema, scope, rows).await,
        }
    }

    async fn fetch(&mut self, schema: &TableSchema, range: DateRange) -> Result<Vec<Row>> {
        match self {
            Store::Sqlite(store) => store.fetch(schema, range).await,
            Store::MySql(store) => store.fetch(schema, range).await,
        }
    }
}
