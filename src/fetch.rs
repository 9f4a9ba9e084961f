//! Report download with retry and exponential backoff.
//!
//! # Architecture
//!
//! - [`FetchReport`]: core trait, "give me the report for this date"
//! - [`HttpFetcher`]: fetches the consolidated club report over HTTP
//! - [`RetryFetch`]: decorator that retries transient failures of any
//!   [`FetchReport`] implementation
//!
//! # Retry Strategy
//!
//! - Only transient failures are retried (network errors, 5xx, 429)
//! - Exponential backoff from `base_delay`, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

/// Source of report HTML.
///
/// `None` asks for the most recent report; `Some(date)` for the report of a
/// past event date.
pub trait FetchReport {
    async fn fetch(&self, date: Option<NaiveDate>) -> Result<String>;
}

/// Downloads the consolidated club report for one club.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Url,
    club_num: String,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.data_url.clone(),
            club_num: config.club_num.clone(),
        })
    }

    /// `<base>?clubNum=<n>[&eventdate=YYYY-MM-DD]`
    pub fn report_url(&self, date: Option<NaiveDate>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("clubNum", &self.club_num);
            if let Some(date) = date {
                query.append_pair("eventdate", &date.format("%Y-%m-%d").to_string());
            }
        }
        url
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the full URL carries the club number; show the host only
        f.debug_struct("HttpFetcher")
            .field("host", &self.base_url.host_str())
            .finish()
    }
}

impl FetchReport for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, date: Option<NaiveDate>) -> Result<String> {
        let url = self.report_url(date);
        let t0 = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, elapsed_ms = t0.elapsed().as_millis(), "Report request rejected");
            return Err(Error::Status {
                status,
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        info!(
            chars = body.chars().count(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Fetched report"
        );
        Ok(body)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchReport`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchReport,
{
    /// Creates a new retry wrapper.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to wrap
    /// * `max_retries` - Retries after the first attempt (0 means try once)
    /// * `base_delay` - Delay before the first retry; doubles each time, capped at 30 s
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T: fmt::Debug> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("inner", &self.inner)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchReport for RetryFetch<T>
where
    T: FetchReport,
{
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, date: Option<NaiveDate>) -> Result<String> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(date).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_total = total_t0.elapsed().as_millis();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total,
                            error = %e,
                            "fetch() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
