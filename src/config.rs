use crate::error::{Error, Result};
use crate::scrapers::consolidated::DEFAULT_SERIES_SUFFIX;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OUTPUT_FILE: &str = "club_results.csv";

/// Everything a run needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Club identifier sent as `clubNum`.
    pub club_num: String,
    /// Substring matched against each row's `Club` cell.
    pub club_name: String,
    /// Base URL of the consolidated club report.
    pub data_url: Url,
    pub output_file: PathBuf,
    pub series_suffix: String,
    pub timeout: Duration,
    pub retries: usize,
    /// Pause between requests during a backfill.
    pub delay: Duration,
}

impl Config {
    /// Validate the three required settings together.
    ///
    /// Every problem is reported in a single [`Error::Config`], so one run
    /// shows all of what is missing.
    ///
    /// # Arguments
    ///
    /// * `club_num` - `CLUB_NUM`, the club identifier.
    /// * `club_name` - `CLUB_NAME`, matched against each row's `Club` cell.
    /// * `data_url` - `DATA_URL`, an absolute `http` or `https` URL.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] listing each setting that is unset, blank or invalid.
    pub fn new(
        club_num: Option<String>,
        club_name: Option<String>,
        data_url: Option<String>,
    ) -> Result<Self> {
        let mut problems = Vec::new();

        let club_num = required("CLUB_NUM", club_num, &mut problems);
        let club_name = required("CLUB_NAME", club_name, &mut problems);
        let data_url = required("DATA_URL", data_url, &mut problems).and_then(|raw| {
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(url) => {
                    problems.push(format!("DATA_URL has unsupported scheme `{}`", url.scheme()));
                    None
                }
                Err(e) => {
                    problems.push(format!("DATA_URL is not a valid URL ({e})"));
                    None
                }
            }
        });

        match (club_num, club_name, data_url) {
            (Some(club_num), Some(club_name), Some(data_url)) if problems.is_empty() => Ok(Self {
                club_num,
                club_name,
                data_url,
                output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
                series_suffix: DEFAULT_SERIES_SUFFIX.to_string(),
                timeout: Duration::from_secs(30),
                retries: 3,
                delay: Duration::from_secs(30),
            }),
            _ => Err(Error::Config(problems)),
        }
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = path.into();
        self
    }

    pub fn with_series_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.series_suffix = suffix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn required(name: &str, value: Option<String>, problems: &mut Vec<String>) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            problems.push(format!("{name} is not set"));
            None
        }
    }
}
