//! Error type shared by the fetch, parse and dataset modules.
//!
//! Shape anomalies in the report (no date sentence, a section without a
//! table, ragged rows) are not represented here: the parser has a fallback
//! for each of them. Duplicates are not errors either.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// One or more required settings are missing or malformed.
    #[error("invalid configuration: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("dataset I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
