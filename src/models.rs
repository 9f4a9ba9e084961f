//! Data models for parsed report rows and the dataset built from them.
//!
//! - [`ResultRecord`]: one club member's finish at one event, keyed by column name
//! - [`IdentityKey`]: the (date, event, participant) triple used for de-duplication
//! - [`ParsedReport`]: everything the parser extracts from one report page
//!
//! Column names come straight from the report's header row, so records are
//! string maps rather than fixed structs. Only the reserved columns below are
//! known ahead of time.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Event date, `YYYY-MM-DD`.
pub const DATE: &str = "Date";
/// Event name with the series suffix removed.
pub const EVENT: &str = "Event";
pub const POSITION: &str = "Position";
pub const GENDER_POSITION: &str = "Gender Position";
/// The participant-name column as the report labels it.
pub const PARTICIPANT: &str = "parkrunner";
pub const CLUB: &str = "Club";
pub const TIME: &str = "Time";

/// Leading columns of every dataset, in file order.
pub const CANONICAL_COLUMNS: [&str; 7] =
    [DATE, EVENT, POSITION, GENDER_POSITION, PARTICIPANT, CLUB, TIME];

/// Name given to a cell that sits past the end of its header row.
///
/// `index` is 0-based; the name uses the 1-based position, so the eighth
/// cell of a row under a seven-column header is `Column8`.
pub fn positional_column(index: usize) -> String {
    format!("Column{}", index + 1)
}

/// A single result row: column name to cleaned cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRecord {
    fields: BTreeMap<String, String>,
}

impl ResultRecord {
    /// Set a column, replacing any previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Like [`get`](Self::get), with `""` for an absent column.
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            date: self.get_or_empty(DATE).to_string(),
            event: self.get_or_empty(EVENT).to_string(),
            participant: self.get_or_empty(PARTICIPANT).to_string(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResultRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The de-duplication key of a dataset row.
///
/// Club, time and positions are deliberately absent: a corrected time for an
/// already recorded finish is treated as a duplicate, not an update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub date: String,
    pub event: String,
    pub participant: String,
}

/// Where [`ParsedReport::event_date`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// Read from the report's "who participated at a parkrun on" sentence.
    Document,
    /// The sentence was missing, so today's date was used.
    Fallback,
}

/// Output of parsing one report page.
#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub event_date: NaiveDate,
    pub date_source: DateSource,
    /// Club rows in document order.
    pub records: Vec<ResultRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_uses_empty_string_for_missing_fields() {
        let record: ResultRecord = [(DATE, "2024-06-01"), (TIME, "21:03")].into_iter().collect();
        assert_eq!(
            record.identity(),
            IdentityKey {
                date: "2024-06-01".into(),
                event: String::new(),
                participant: String::new(),
            }
        );
    }

    #[test]
    fn test_positional_column_is_one_based() {
        assert_eq!(positional_column(0), "Column1");
        assert_eq!(positional_column(7), "Column8");
    }

    #[test]
    fn test_identity_ignores_time_and_club() {
        let a: ResultRecord = [
            (DATE, "2024-06-01"),
            (EVENT, "Bushy"),
            (PARTICIPANT, "Jo BLOGGS"),
            (TIME, "21:03"),
        ]
        .into_iter()
        .collect();
        let mut b = a.clone();
        b.insert(TIME, "20:59");
        b.insert(CLUB, "Westbourne RC");
        assert_eq!(a.identity(), b.identity());
    }
}
