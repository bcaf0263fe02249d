// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and command dispatch.

use crate::churn::ISSUE_CHURN_TABLE;
use crate::commands;
use crate::config::Config;
use crate::dates::{self, DateRange};
use crate::query::OutputFormat;
use crate::signups::SIGNUPS_TABLE;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{Local, NaiveDate};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file [default: ~/.stats]
    #[arg(short, long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Compute and log the rows without touching the metrics database
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Count daily signups by client platform
    Signups {
        #[command(flatten)]
        range: RangeArgs,

        /// Password for the MySQL metrics database
        #[arg(long)]
        mysql_password: Option<String>,
    },

    /// Count issues opened and closed per day, by priority
    IssueChurn {
        /// Password for the MySQL metrics database
        #[arg(long)]
        mysql_password: Option<String>,

        /// GitHub token used for issue search
        #[arg(long)]
        github_token: Option<String>,
    },

    /// Show rows stored in the metrics database
    Query {
        #[command(subcommand)]
        table: QueryTable,
    },
}

#[derive(Parser, Debug)]
enum QueryTable {
    /// Show daily signups by platform
    Signups {
        #[command(flatten)]
        range: RangeArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Password for the MySQL metrics database
        #[arg(long)]
        mysql_password: Option<String>,
    },

    /// Show daily issue churn
    Churn {
        #[command(flatten)]
        range: RangeArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Password for the MySQL metrics database
        #[arg(long)]
        mysql_password: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct RangeArgs {
    /// First day to report on (YYYY-MM-DD) [default: yesterday]
    #[arg(value_parser = dates::parse_date, requires = "end")]
    start: Option<NaiveDate>,

    /// Day after the last day to report on (YYYY-MM-DD) [default: today]
    #[arg(value_parser = dates::parse_date)]
    end: Option<NaiveDate>,
}

impl RangeArgs {
    fn resolve(&self, today: NaiveDate) -> Result<DateRange> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Ok(DateRange::new(start, end)?),
            _ => Ok(DateRange::yesterday(today)),
        }
    }
}

/// Parse arguments and dispatch to the appropriate command.
pub async fn dispatch() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config =
        Config::load_or_default(config_path.as_deref()).context("failed to load configuration")?;
    let today = Local::now().date_naive();

    match args.command {
        Command::Signups {
            range,
            mysql_password,
        } => {
            config.apply_overrides(mysql_password, None);
            let range = range.resolve(today)?;
            let target = (!args.dry_run)
                .then(|| config.store_target())
                .transpose()?;
            commands::run_signups(&config, range, target.as_ref()).await?;
        }
        Command::IssueChurn {
            mysql_password,
            github_token,
        } => {
            config.apply_overrides(mysql_password, github_token);
            let target = (!args.dry_run)
                .then(|| config.store_target())
                .transpose()?;
            commands::run_issue_churn(&config, target.as_ref()).await?;
        }
        Command::Query { table } => {
            let (schema, range, format, mysql_password) = match table {
                QueryTable::Signups {
                    range,
                    format,
                    mysql_password,
                } => (&SIGNUPS_TABLE, range, format, mysql_password),
                QueryTable::Churn {
                    range,
                    format,
                    mysql_password,
                } => (&ISSUE_CHURN_TABLE, range, format, mysql_password),
            };
            config.apply_overrides(mysql_password, None);
            let target = config.store_target()?;
            commands::run_query(&target, schema, range.resolve(today)?, format).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_signups_dates() {
        let args =
            Args::try_parse_from(["riot-stats", "signups", "2024-01-01", "2024-01-03"]).unwrap();
        let Command::Signups { range, .. } = args.command else {
            panic!("expected signups command");
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = range.resolve(today).unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.num_days(), 2);
    }

    #[test]
    fn test_signups_default_to_yesterday() {
        let args = Args::try_parse_from(["riot-stats", "--dry-run", "signups"]).unwrap();
        assert!(args.dry_run);
        let Command::Signups { range, .. } = args.command else {
            panic!("expected signups command");
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let range = range.resolve(today).unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(range.end(), today);
    }

    #[test]
    fn test_signups_needs_both_dates() {
        assert!(Args::try_parse_from(["riot-stats", "signups", "2024-01-01"]).is_err());
        assert!(
            Args::try_parse_from(["riot-stats", "signups", "01/01/2024", "2024-01-02"]).is_err()
        );
    }

    #[test]
    fn test_issue_churn_flags() {
        let args = Args::try_parse_from([
            "riot-stats",
            "issue-churn",
            "--mysql-password",
            "pw",
            "--github-token",
            "tok",
        ])
        .unwrap();
        let Command::IssueChurn {
            mysql_password,
            github_token,
        } = args.command
        else {
            panic!("expected issue-churn command");
        };
        assert_eq!(mysql_password.as_deref(), Some("pw"));
        assert_eq!(github_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_query_json() {
        let args =
            Args::try_parse_from(["riot-stats", "query", "churn", "--format", "json"]).unwrap();
        let Command::Query {
            table: QueryTable::Churn { format, .. },
        } = args.command
        else {
            panic!("expected query churn command");
        };
        assert_eq!(format, OutputFormat::Json);
    }
}
