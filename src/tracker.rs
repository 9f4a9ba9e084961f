//! Fetch → parse → accumulate workflows.
//!
//! [`Tracker`] runs either one week ([`Tracker::fetch_single_week`]) or a
//! backfill of several consecutive weeks ([`Tracker::backfill`]). Everything
//! happens strictly in order: each week is fully written before the next
//! request goes out, so later weeks see rows saved by earlier ones.
//!
//! The fetcher and the pause between backfill requests are both injected,
//! which is how the tests run backfills without a network or a clock.

use crate::error::Result;
use crate::fetch::FetchReport;
use crate::models::ParsedReport;
use crate::outputs::dataset::{WriteMode, accumulate};
use crate::scrapers::consolidated::{ReportParser, find_event_date};
use crate::utils::truncate_for_log;
use chrono::{Days, NaiveDate};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Pause taken before each historical request of a backfill.
pub trait Delay {
    async fn wait(&self);
}

/// Sleep for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl Delay for FixedDelay {
    async fn wait(&self) {
        info!(delay = ?self.0, "Sleeping before next request");
        sleep(self.0).await;
    }
}

/// Result of one fetch → parse → accumulate cycle.
#[derive(Debug)]
pub struct WeekOutcome {
    pub report: ParsedReport,
    /// Rows actually added to the dataset.
    pub written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekStatus {
    Saved { found: usize, written: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekReport {
    /// The date requested (for the first week, the report's own date).
    pub date: NaiveDate,
    pub status: WeekStatus,
}

#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub weeks: Vec<WeekReport>,
}

impl BackfillSummary {
    pub fn written(&self) -> usize {
        self.weeks
            .iter()
            .map(|w| match w.status {
                WeekStatus::Saved { written, .. } => written,
                WeekStatus::Failed(_) => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &WeekReport> {
        self.weeks
            .iter()
            .filter(|w| matches!(w.status, WeekStatus::Failed(_)))
    }
}

pub struct Tracker<F, D> {
    fetcher: F,
    delay: D,
    parser: ReportParser,
    dataset: PathBuf,
    next_mode: WriteMode,
}

impl<F, D> Tracker<F, D>
where
    F: FetchReport,
    D: Delay,
{
    pub fn new(fetcher: F, delay: D, parser: ReportParser, dataset: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            delay,
            parser,
            dataset: dataset.into(),
            next_mode: WriteMode::Append,
        }
    }

    /// Overwrite the dataset with the first week written by this tracker.
    /// Later weeks append as usual.
    pub fn rebuild_first(mut self) -> Self {
        self.next_mode = WriteMode::Rebuild;
        self
    }

    /// Fetch, parse and save one week. Fetch errors are returned as is.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_single_week(&mut self, date: Option<NaiveDate>) -> Result<WeekOutcome> {
        let html = self.fetcher.fetch(date).await?;
        let report = self.parser.parse(&html);
        info!(count = report.records.len(), "Total club results");
        let written = self.save(&report).await?;
        Ok(WeekOutcome { report, written })
    }

    /// Save the latest week and then `num_weeks - 1` earlier ones.
    ///
    /// The latest report decides the starting date; each earlier week is
    /// seven days before the previous one. Failures of earlier weeks are
    /// logged and recorded in the summary without stopping the run. If the
    /// latest report states no date there is nothing to count back from, so
    /// the run stops with an empty summary.
    ///
    /// # Arguments
    ///
    /// * `num_weeks` - Weeks to cover including the latest; `0` counts as `1`.
    ///
    /// # Errors
    ///
    /// Only a failure to fetch or save the latest report. Earlier weeks
    /// surface as [`WeekStatus::Failed`] instead.
    #[instrument(level = "info", skip(self))]
    pub async fn backfill(&mut self, num_weeks: u32) -> Result<BackfillSummary> {
        let num_weeks = num_weeks.max(1);
        info!(num_weeks, "Backfilling historical data");

        let mut summary = BackfillSummary::default();
        let html = self.fetcher.fetch(None).await?;
        let Some(latest) = find_event_date(&html) else {
            warn!("Could not find event date in page");
            debug!(preview = %truncate_for_log(&html, 300), "Latest report");
            return Ok(summary);
        };
        info!(%latest, "Most recent results");

        let report = self.parser.parse_with_fallback(&html, latest);
        let written = self.save(&report).await?;
        info!(week = %latest, found = report.records.len(), written, "Week saved");
        summary.weeks.push(WeekReport {
            date: latest,
            status: WeekStatus::Saved {
                found: report.records.len(),
                written,
            },
        });

        for k in 1..num_weeks {
            self.delay.wait().await;

            let Some(date) = latest.checked_sub_days(Days::new(7 * u64::from(k))) else {
                warn!(%latest, k, "Date out of range; stopping backfill");
                break;
            };
            info!(week = k + 1, of = num_weeks, %date, "Fetching week");

            let status = match self.fetch_single_week(Some(date)).await {
                Ok(outcome) => {
                    info!(week = %date, found = outcome.report.records.len(), written = outcome.written, "Week saved");
                    WeekStatus::Saved {
                        found: outcome.report.records.len(),
                        written: outcome.written,
                    }
                }
                Err(e) => {
                    error!(week = %date, error = %e, "Week failed; continuing");
                    WeekStatus::Failed(e.to_string())
                }
            };
            summary.weeks.push(WeekReport { date, status });
        }

        info!(
            weeks = summary.weeks.len(),
            written = summary.written(),
            failed = summary.failed().count(),
            "Backfill complete"
        );
        Ok(summary)
    }

    async fn save(&mut self, report: &ParsedReport) -> Result<usize> {
        let written = accumulate(&report.records, &self.dataset, self.next_mode).await?;
        if written > 0 {
            self.next_mode = WriteMode::Append;
        }
        Ok(written)
    }
}
