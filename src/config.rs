// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the reporting jobs.

use crate::db::{MySqlTarget, StoreTarget};
use crate::error::StatsError;
use crate::github::IssueQuery;
use crate::synapse::SynapseDb;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;

/// Credentials and settings, read from a TOML file and overridable from the
/// command line.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub mysql_password: Option<String>,
    pub github_token: Option<String>,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default)]
    pub issue_churn: IssueChurnConfig,
}

/// Where aggregated rows are written.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Destination {
    Mysql {
        #[serde(default = "default_mysql_host")]
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        #[serde(default = "default_metrics_name")]
        user: String,
        #[serde(default = "default_metrics_name")]
        database: String,
    },
    Sqlite {
        path: Utf8PathBuf,
    },
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_metrics_name() -> String {
    "businessmetrics".to_string()
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Mysql {
            host: default_mysql_host(),
            port: default_mysql_port(),
            user: default_metrics_name(),
            database: default_metrics_name(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct IssueChurnConfig {
    /// Repository in `owner/name` form.
    pub repo: String,
    pub label: String,
    /// Earliest creation date searched.
    pub since: NaiveDate,
}

impl Default for IssueChurnConfig {
    fn default() -> Self {
        Self {
            repo: "vector-im/riot-web".to_string(),
            label: "bug".to_string(),
            since: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn for_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl Config {
    /// Load configuration from a file. Files ending in `.toml` are TOML;
    /// anything else, including the default `~/.stats`, is YAML.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read config file at {}", path))?;

        Self::parse(&content, ConfigFormat::for_path(path))
            .with_context(|| format!("failed to parse config file at {}", path))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => Ok(toml::from_str(content)?),
            // An empty YAML document is `null`, not an empty mapping.
            ConfigFormat::Yaml if content.trim().is_empty() => Ok(Self::default()),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
        }
    }

    /// Load configuration from `path` if it exists, otherwise start from the
    /// defaults.
    pub fn load_or_default(path: Option<&Utf8Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                tracing::debug!(%path, "loading configuration");
                Self::load(path)
            }
            Some(path) => {
                tracing::debug!(%path, "no configuration file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// `~/.stats`, if the home directory is known.
    pub fn default_path() -> Option<Utf8PathBuf> {
        let home = dirs::home_dir()?;
        Utf8PathBuf::from_path_buf(home)
            .ok()
            .map(|home| home.join(".stats"))
    }

    /// Replace file values with any given on the command line.
    pub fn apply_overrides(
        &mut self,
        mysql_password: Option<String>,
        github_token: Option<String>,
    ) {
        if mysql_password.is_some() {
            self.mysql_password = mysql_password;
        }
        if github_token.is_some() {
            self.github_token = github_token;
        }
    }

    pub fn synapse_db(&self) -> Result<SynapseDb, StatsError> {
        Ok(SynapseDb {
            host: required(&self.db_host, "db_host")?.to_string(),
            port: self.db_port.unwrap_or(5432),
            name: required(&self.db_name, "db_name")?.to_string(),
            user: required(&self.db_user, "db_user")?.to_string(),
            password: required(&self.db_password, "db_password")?.to_string(),
        })
    }

    pub fn github_token(&self) -> Result<&str, StatsError> {
        required(&self.github_token, "github_token")
    }

    /// The destination store, with the credentials it needs.
    pub fn store_target(&self) -> Result<StoreTarget, StatsError> {
        match &self.destination {
            Destination::Mysql {
                host,
                port,
                user,
                database,
            } => Ok(StoreTarget::MySql(MySqlTarget {
                host: host.clone(),
                port: *port,
                user: user.clone(),
                database: database.clone(),
                password: required(&self.mysql_password, "mysql_password")?.to_string(),
            })),
            Destination::Sqlite { path } => Ok(StoreTarget::Sqlite(path.clone())),
        }
    }

    pub fn issue_query(&self) -> IssueQuery {
        IssueQuery {
            repo: self.issue_churn.repo.clone(),
            label: self.issue_churn.label.clone(),
        }
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, StatsError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(StatsError::ConfigurationMissing { key })
}
