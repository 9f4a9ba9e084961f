//! Command-line interface definitions.
//!
//! The three required settings may come from flags or from the environment
//! (`CLUB_NUM`, `CLUB_NAME`, `DATA_URL`), which keeps them out of shell
//! history and CI logs. They are optional here and validated together by
//! [`Cli::config`].

use crate::config::{Config, DEFAULT_OUTPUT_FILE};
use crate::error::Result;
use crate::scrapers::consolidated::DEFAULT_SERIES_SUFFIX;
use chrono::NaiveDate;
use clap::Parser;
use std::time::Duration;

/// Collect a running club's weekly parkrun results into a CSV file.
///
/// # Examples
///
/// ```sh
/// # Latest week
/// CLUB_NUM=20098 CLUB_NAME=Westbourne DATA_URL=https://... club_results
///
/// # Latest week plus the 7 before it, 30s apart
/// club_results --backfill 8
///
/// # One specific past week
/// club_results --date 2024-05-25
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Club number used in the report query
    #[arg(long, env = "CLUB_NUM", hide_env_values = true)]
    pub club_num: Option<String>,

    /// Club name; rows whose Club contains this (any case) are kept
    #[arg(long, env = "CLUB_NAME", hide_env_values = true)]
    pub club_name: Option<String>,

    /// Base URL of the consolidated club report
    #[arg(long, env = "DATA_URL", hide_env_values = true)]
    pub data_url: Option<String>,

    /// CSV dataset to create or extend
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output: String,

    /// Also fetch this many weeks in total, newest first
    #[arg(long, value_name = "WEEKS", num_args = 0..=1, default_missing_value = "4", conflicts_with = "date")]
    pub backfill: Option<u32>,

    /// Seconds to wait between backfill requests
    #[arg(long, default_value_t = 30)]
    pub delay_secs: u64,

    /// Fetch the report for this event date (YYYY-MM-DD) instead of the latest
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Overwrite the dataset instead of appending to it
    #[arg(long)]
    pub rebuild: bool,

    /// Suffix removed from event names
    #[arg(long, default_value = DEFAULT_SERIES_SUFFIX)]
    pub series_suffix: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Retries for transient network failures
    #[arg(long, default_value_t = 3)]
    pub retries: usize,
}

impl Cli {
    pub fn config(&self) -> Result<Config> {
        Ok(Config::new(
            self.club_num.clone(),
            self.club_name.clone(),
            self.data_url.clone(),
        )?
        .with_output_file(&self.output)
        .with_series_suffix(&self.series_suffix)
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_retries(self.retries)
        .with_delay(Duration::from_secs(self.delay_secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "club_results",
        "--club-num",
        "20098",
        "--club-name",
        "Westbourne",
        "--data-url",
        "https://results.example.org/consolidatedclub/",
    ];

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(REQUIRED);
        assert_eq!(cli.output, "club_results.csv");
        assert_eq!(cli.backfill, None);
        assert_eq!(cli.delay_secs, 30);
        assert!(!cli.rebuild);

        let config = cli.config().unwrap();
        assert_eq!(config.club_name, "Westbourne");
        assert_eq!(config.delay, Duration::from_secs(30));
    }

    #[test]
    fn test_cli_backfill_default_weeks() {
        let cli = Cli::parse_from(REQUIRED.into_iter().chain(["--backfill"]));
        assert_eq!(cli.backfill, Some(4));

        let cli = Cli::parse_from(REQUIRED.into_iter().chain(["--backfill", "8"]));
        assert_eq!(cli.backfill, Some(8));
    }

    #[test]
    fn test_cli_date() {
        let cli = Cli::parse_from(REQUIRED.into_iter().chain(["--date", "2024-05-25"]));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 5, 25));
    }

    #[test]
    fn test_cli_backfill_conflicts_with_date() {
        let parsed =
            Cli::try_parse_from(REQUIRED.into_iter().chain(["--backfill", "2", "--date", "2024-05-25"]));
        assert!(parsed.is_err());
    }
}
