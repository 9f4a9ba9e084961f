//! Persistence of parsed results.
//!
//! # Submodules
//!
//! - [`dataset`]: the deduplicated CSV dataset (identity-key loading and
//!   accumulation of new rows)
//!
//! # Output Structure
//!
//! ```text
//! club_results.csv       # one row per club member per event per week
//! club_results.csv.tmp   # only present mid-rewrite when the header widens
//! ```

pub mod dataset;
