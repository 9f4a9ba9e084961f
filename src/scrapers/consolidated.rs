//! Parser for the parkrun consolidated club report.
//!
//! The report looks roughly like this:
//!
//! ```text
//! <p>... who participated at a parkrun on 2024-06-01 ...</p>
//! <h2>Bushy parkrun</h2>
//! <table>
//!   <tr><th>Position</th><th>Gender Position</th><th>parkrunner</th><th>Club</th><th>Time</th></tr>
//!   <tr><td>12</td><td>10</td><td>Jo BLOGGS</td><td>Westbourne RC</td><td>19:02</td></tr>
//! </table>
//! <h2>Poole parkrun</h2>
//! ...
//! ```
//!
//! The document is parsed into a tree and walked in document order. Every
//! `<h2>` starts an [`EventSection`]; the first `<table>` after it (and before
//! the next heading) holds that event's results. Anything before the first
//! heading is ignored.

use crate::models::{
    CLUB, DATE, DateSource, EVENT, ParsedReport, ResultRecord, positional_column,
};
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info, instrument, warn};

/// Suffix stripped from event headings when none is configured.
pub const DEFAULT_SERIES_SUFFIX: &str = "parkrun";

static EVENT_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"who participated at a parkrun on (\d{4}-\d{2}-\d{2})").unwrap()
});

/// One event heading and the first results table under it.
#[derive(Debug)]
pub struct EventSection<'a> {
    /// Cleaned heading text, suffix not yet removed.
    pub heading: String,
    pub table: Option<ElementRef<'a>>,
}

/// Extracts a club's rows from a consolidated report.
#[derive(Debug, Clone)]
pub struct ReportParser {
    club_filter: String,
    series_suffix: String,
}

impl ReportParser {
    /// `club_filter` is matched as a case-insensitive substring of each row's
    /// `Club` cell. `series_suffix` is removed from the end of event names.
    pub fn new(club_filter: &str, series_suffix: &str) -> Self {
        Self {
            club_filter: club_filter.to_lowercase(),
            series_suffix: series_suffix.trim().to_string(),
        }
    }

    /// Parse a report, falling back to today's date if it names none.
    pub fn parse(&self, html: &str) -> ParsedReport {
        self.parse_with_fallback(html, Local::now().date_naive())
    }

    /// Parse a report, using `fallback_date` if it names no event date.
    ///
    /// # Arguments
    ///
    /// * `html` - The full report page.
    /// * `fallback_date` - Stamped on every row when the page has no
    ///   "who participated at a parkrun on" sentence.
    ///
    /// # Returns
    ///
    /// The event date, where it came from, and the club's rows across all
    /// event sections in document order. Each row carries `Event` and `Date`
    /// on top of its table columns.
    #[instrument(level = "info", skip_all, fields(bytes = html.len()))]
    pub fn parse_with_fallback(&self, html: &str, fallback_date: NaiveDate) -> ParsedReport {
        let (event_date, date_source) = match find_event_date(html) {
            Some(date) => (date, DateSource::Document),
            None => {
                warn!(%fallback_date, "No event date sentence in report; using fallback date");
                (fallback_date, DateSource::Fallback)
            }
        };
        info!(%event_date, "Event date");
        let date_text = event_date.format("%Y-%m-%d").to_string();

        let document = Html::parse_document(html);
        let sections = split_sections(&document);
        debug!(count = sections.len(), "Found event sections");

        let mut records = Vec::new();
        for section in sections {
            let event = strip_series_suffix(&section.heading, &self.series_suffix).to_string();
            let Some(table) = section.table else {
                debug!(%event, "Section has no results table; skipping");
                continue;
            };

            let before = records.len();
            for mut record in table_records(table) {
                let club = record.get_or_empty(CLUB);
                let is_match = club.to_lowercase().contains(&self.club_filter);
                debug!(%club, is_match, "Club filter");
                if is_match {
                    record.insert(EVENT, event.as_str());
                    record.insert(DATE, date_text.as_str());
                    records.push(record);
                }
            }
            info!(%event, members = records.len() - before, "Parsed event");
        }

        ParsedReport {
            event_date,
            date_source,
            records,
        }
    }
}

/// Find the date the report covers, if the report states one.
pub fn find_event_date(html: &str) -> Option<NaiveDate> {
    let caps = EVENT_DATE_RE.captures(html)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

/// Split a document into event sections at each `<h2>`.
///
/// Headings whose text is blank do not open a section, so a table that
/// follows one is attributed to nothing.
pub fn split_sections(document: &Html) -> Vec<EventSection<'_>> {
    let mut sections: Vec<EventSection<'_>> = Vec::new();
    // false while inside a blank-headed or pre-heading region
    let mut open = false;

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        match element.value().name() {
            "h2" => {
                let heading = clean_text(&element.inner_html());
                open = !heading.is_empty();
                if open {
                    sections.push(EventSection {
                        heading,
                        table: None,
                    });
                }
            }
            "table" if open => {
                if let Some(section) = sections.last_mut() {
                    if section.table.is_none() {
                        section.table = Some(element);
                    }
                }
            }
            _ => {}
        }
    }
    sections
}

/// Turn a results table into records keyed by its header row.
///
/// Only the table's own rows are read, directly or through
/// `thead`/`tbody`/`tfoot`; rows of tables nested in a cell stay part of
/// that cell's text.
///
/// # Returns
///
/// One record per data row. The header is the first row with any cells, so
/// leading empty rows are skipped. Data rows shorter than the header produce
/// partial records; extra cells are keyed by [`positional_column`]. A table
/// with no rows, or only a header, yields nothing.
pub fn table_records(table: ElementRef<'_>) -> Vec<ResultRecord> {
    let mut rows = table_rows(table)
        .map(row_cells)
        .filter(|cells| !cells.is_empty());

    let Some(headers) = rows.next() else {
        return Vec::new();
    };

    rows.map(|cells| {
        cells
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                let column = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| positional_column(i));
                (column, cell)
            })
            .collect::<ResultRecord>()
    })
    .collect()
}

fn table_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    child_elements(table).flat_map(|child| match child.value().name() {
        "tr" => vec![child],
        "thead" | "tbody" | "tfoot" => child_elements(child)
            .filter(|row| row.value().name() == "tr")
            .collect(),
        _ => Vec::new(),
    })
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    child_elements(row)
        .filter(|cell| matches!(cell.value().name(), "th" | "td"))
        .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
        .collect()
}

/// Clean an HTML fragment down to its visible text.
///
/// Tags are dropped, entities decoded, and whitespace runs (non-breaking
/// spaces and newlines included) collapsed to single spaces.
pub fn clean_text(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    collapse_whitespace(&parsed.root_element().text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Remove a trailing ` <suffix>` from an event heading, ignoring case.
pub fn strip_series_suffix<'a>(heading: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return heading;
    }
    let tail_len = suffix.len() + 1;
    if heading.len() <= tail_len {
        return heading;
    }
    let split = heading.len() - tail_len;
    if !heading.is_char_boundary(split) {
        return heading;
    }
    let (head, tail) = heading.split_at(split);
    if tail.starts_with(' ') && tail[1..].eq_ignore_ascii_case(suffix) {
        head
    } else {
        heading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PARTICIPANT, TIME};

    const REPORT: &str = r#"
<html><body>
<h1>Consolidated club report</h1>
<p>This report lists members who participated at a parkrun on 2024-06-01.</p>
<table><tr><th>Ignored</th></tr><tr><td>before any heading</td></tr></table>
<h2>Bushy parkrun</h2>
<table class="results">
  <tr><th>Position</th><th>Gender Position</th><th>parkrunner</th><th>Club</th><th>Time</th></tr>
  <tr><td>12</td><td>10</td><td><a href="/x">Jo BLOGGS</a></td><td>westbourne rc</td><td><b>19:02</b>&nbsp;</td></tr>
  <tr><td>13</td><td>11</td><td>Sam SMITH</td><td>Other Harriers</td><td>19:10</td></tr>
</table>
<h2>Empty parkrun</h2>
<p>No results this week.</p>
<h2>Poole PARKRUN</h2>
<table>
  <tr><th>Position</th><th>Gender Position</th><th>parkrunner</th><th>Club</th><th>Time</th></tr>
  <tr><td>40</td><td>5</td><td>Alex
      JONES</td><td>Westbourne Running Club</td><td>24:40</td></tr>
</table>
<table>
  <tr><th>Second table</th></tr>
  <tr><td>Westbourne</td></tr>
</table>
</body></html>
"#;

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
    }

    #[test]
    fn test_extracts_club_rows_in_document_order() {
        let parser = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX);
        let report = parser.parse_with_fallback(REPORT, fallback());

        assert_eq!(report.event_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(report.date_source, DateSource::Document);
        assert_eq!(report.records.len(), 2);

        let first = &report.records[0];
        assert_eq!(first.get(EVENT), Some("Bushy"));
        assert_eq!(first.get(DATE), Some("2024-06-01"));
        assert_eq!(first.get(PARTICIPANT), Some("Jo BLOGGS"));
        assert_eq!(first.get(TIME), Some("19:02"));

        let second = &report.records[1];
        assert_eq!(second.get(EVENT), Some("Poole"));
        assert_eq!(second.get(PARTICIPANT), Some("Alex JONES"));
    }

    #[test]
    fn test_club_filter_is_case_insensitive_substring() {
        let parser = ReportParser::new("WESTBOURNE", DEFAULT_SERIES_SUFFIX);
        let report = parser.parse_with_fallback(REPORT, fallback());
        assert!(report.records.iter().all(|r| r.get(CLUB) != Some("Other Harriers")));
        assert!(report.records.iter().any(|r| r.get(CLUB) == Some("westbourne rc")));
    }

    #[test]
    fn test_missing_date_falls_back() {
        let html = "<h2>Bushy parkrun</h2><table><tr><th>Club</th></tr><tr><td>Westbourne</td></tr></table>";
        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        assert_eq!(report.date_source, DateSource::Fallback);
        assert_eq!(report.event_date, fallback());
        assert_eq!(report.records[0].get(DATE), Some("2030-01-01"));
    }

    #[test]
    fn test_impossible_date_falls_back() {
        assert_eq!(find_event_date("who participated at a parkrun on 2024-13-45"), None);
    }

    #[test]
    fn test_overflow_cells_get_positional_names() {
        let html = "<h2>Bushy parkrun</h2><table>\
                    <tr><th>Club</th><th>Time</th></tr>\
                    <tr><td>Westbourne</td><td>20:00</td><td>PB</td></tr>\
                    <tr><td>Westbourne</td></tr>\
                    </table>";
        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].get("Column3"), Some("PB"));
        assert_eq!(report.records[1].get(TIME), None);
    }

    #[test]
    fn test_sections_take_only_the_first_table() {
        let document = Html::parse_document(REPORT);
        let sections = split_sections(&document);
        let headings: Vec<_> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, ["Bushy parkrun", "Empty parkrun", "Poole PARKRUN"]);
        assert!(sections[1].table.is_none());

        let poole = table_records(sections[2].table.unwrap());
        assert_eq!(poole.len(), 1);
        assert!(poole[0].get("Second table").is_none());
    }

    #[test]
    fn test_cleans_markup_entities_and_whitespace() {
        assert_eq!(clean_text("<b>12:34</b>&nbsp;"), "12:34");
        assert_eq!(clean_text("  Jo\n   <i>BLOGGS</i> &amp; co "), "Jo BLOGGS & co");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_strips_series_suffix_case_insensitively() {
        assert_eq!(strip_series_suffix("Bushy parkrun", "parkrun"), "Bushy");
        assert_eq!(strip_series_suffix("Poole PARKRUN", "parkrun"), "Poole");
        assert_eq!(strip_series_suffix("parkrun", "parkrun"), "parkrun");
        assert_eq!(strip_series_suffix("Bushyparkrun", "parkrun"), "Bushyparkrun");
        assert_eq!(strip_series_suffix("Bushy parkrun", ""), "Bushy parkrun");
    }

    #[test]
    fn test_header_is_first_row_with_cells() {
        let html = "<h2>Bushy parkrun</h2><table>\
                    <tr></tr>\
                    <tr><th>Club</th></tr>\
                    <tr><td>Westbourne</td></tr>\
                    </table>";
        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].get(CLUB), Some("Westbourne"));
        assert_eq!(report.records[0].get("Column1"), None);
    }

    #[test]
    fn test_nested_table_rows_stay_inside_their_cell() {
        let html = "<h2>Bushy parkrun</h2><table>\
                    <thead><tr><th>Club</th><th>Time</th></tr></thead>\
                    <tbody><tr>\
                    <td>Westbourne<table><tr><td>Westbourne inner</td></tr></table></td>\
                    <td>20:00</td>\
                    </tr></tbody>\
                    </table>";
        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].get(CLUB), Some("WestbourneWestbourne inner"));
        assert_eq!(report.records[0].get(TIME), Some("20:00"));
    }

    #[test]
    fn test_blank_heading_opens_no_section() {
        let html = "<p>who participated at a parkrun on 2024-06-01</p>\
                    <h2>Bushy parkrun</h2><p>No results this week.</p>\
                    <h2> <span></span>&nbsp;</h2>\
                    <table><tr><th>Club</th></tr><tr><td>Westbourne</td></tr></table>";
        let document = Html::parse_document(html);
        let sections = split_sections(&document);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "Bushy parkrun");
        assert!(sections[0].table.is_none());

        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_header_cells_are_cleaned() {
        let html = "<h2>Bushy parkrun</h2><table>\
                    <tr><th><b>Club</b>&nbsp;</th><th>\n  Time <i></i></th></tr>\
                    <tr><td>Westbourne</td><td>20:00</td></tr>\
                    </table>";
        let report = ReportParser::new("Westbourne", DEFAULT_SERIES_SUFFIX)
            .parse_with_fallback(html, fallback());
        let columns: Vec<_> = report.records[0].columns().collect();
        assert_eq!(columns, [CLUB, DATE, EVENT, TIME]);
    }
}
