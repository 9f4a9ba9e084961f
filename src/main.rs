//! # Club Results
//!
//! Collects a running club's weekly parkrun results from the consolidated
//! club report into a single deduplicated CSV file.
//!
//! ## Usage
//!
//! ```sh
//! export CLUB_NUM=20098 CLUB_NAME=Westbourne DATA_URL=https://...
//! club_results                 # latest week
//! club_results --backfill 8    # latest week and the seven before it
//! ```
//!
//! ## Architecture
//!
//! Each week goes through the same pipeline:
//! 1. **Fetching**: download the report HTML ([`fetch`])
//! 2. **Parsing**: pick the club's rows out of each event table ([`scrapers`])
//! 3. **Accumulating**: append rows not already in the dataset ([`outputs`])
//!
//! [`tracker`] drives the pipeline for one week or a whole backfill, strictly
//! one request at a time.

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod outputs;
mod scrapers;
mod tracker;
mod utils;

use cli::Cli;
use fetch::{HttpFetcher, RetryFetch};
use models::{DATE, EVENT, PARTICIPANT, TIME};
use scrapers::consolidated::ReportParser;
use tracker::{FixedDelay, Tracker, WeekStatus};
use utils::{ensure_writable_parent, redacted};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("club_results starting up");

    let args = Cli::parse();
    debug!(?args.backfill, ?args.date, rebuild = args.rebuild, "Parsed CLI arguments");

    // --- Configuration (fatal before any network activity) ---
    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Missing required configuration");
            return Err(e.into());
        }
    };
    info!(
        club_num = %redacted(&config.club_num),
        club_name = %redacted(&config.club_name),
        host = config.data_url.host_str().unwrap_or(""),
        output = %config.output_file.display(),
        "Configuration loaded"
    );

    if let Err(e) = ensure_writable_parent(&config.output_file).await {
        error!(
            path = %config.output_file.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = RetryFetch::new(
        HttpFetcher::new(&config)?,
        config.retries,
        Duration::from_secs(2),
    );
    let parser = ReportParser::new(&config.club_name, &config.series_suffix);
    let mut tracker = Tracker::new(
        fetcher,
        FixedDelay(config.delay),
        parser,
        &config.output_file,
    );
    if args.rebuild {
        tracker = tracker.rebuild_first();
    }

    match args.backfill {
        Some(weeks) => {
            let summary = tracker.backfill(weeks).await?;
            for week in &summary.weeks {
                match &week.status {
                    WeekStatus::Saved { found, written } => {
                        info!(week = %week.date, found, written, "Week saved")
                    }
                    WeekStatus::Failed(reason) => {
                        error!(week = %week.date, %reason, "Week was not saved")
                    }
                }
            }
            info!(
                weeks = summary.weeks.len(),
                written = summary.written(),
                "Backfill summary"
            );
        }
        None => {
            let outcome = tracker.fetch_single_week(args.date).await?;
            if outcome.written == 0 {
                info!("No new results");
            }
            info!(
                event_date = %outcome.report.event_date,
                date_source = ?outcome.report.date_source,
                found = outcome.report.records.len(),
                written = outcome.written,
                "Results summary"
            );
            for r in &outcome.report.records {
                info!(
                    "  {} | {:20} | {:20} | {}",
                    r.get_or_empty(DATE),
                    r.get_or_empty(EVENT),
                    r.get_or_empty(PARTICIPANT),
                    r.get_or_empty(TIME)
                );
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
