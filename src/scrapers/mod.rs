//! Report scrapers.
//!
//! The only supported source is the parkrun consolidated club report, an HTML
//! page with one `<h2>` heading per event followed by a results table.
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Consolidated club report | [`consolidated`] | DOM walk with `scraper` |
//!
//! Fetching the page is handled by [`crate::fetch`]; scrapers only ever see
//! the downloaded HTML text.

pub mod consolidated;
