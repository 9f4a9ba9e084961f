//! The persisted CSV dataset of club results.
//!
//! The file grows by appending. Its header is the canonical columns followed
//! by every extra column seen so far, sorted:
//!
//! ```text
//! Date,Event,Position,Gender Position,parkrunner,Club,Time,Age Grade,Note
//! 2024-06-01,Bushy,12,10,Jo BLOGGS,Westbourne RC,19:02,71.2%,
//! ```
//!
//! Rows are identified by their (`Date`, `Event`, `parkrunner`) triple. Before
//! every write the file is re-read so that rows written earlier in the same
//! run are seen as duplicates too.
//!
//! # Mutation
//!
//! Each [`accumulate`] call changes the file at most once: a create (or
//! truncate) with header, a plain append, or, when new columns appear, a full
//! rewrite into a sibling temp file followed by a rename.

use crate::error::Result;
use crate::models::{
    CANONICAL_COLUMNS, DATE, EVENT, IdentityKey, PARTICIPANT, ResultRecord, positional_column,
};
use itertools::Itertools;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// How [`accumulate`] treats an existing dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Skip rows already recorded and append the rest.
    Append,
    /// Ignore the existing file and overwrite it with this batch.
    Rebuild,
}

/// Load the identity triple of every row already in the dataset.
///
/// # Arguments
///
/// * `path` - The dataset file. It does not have to exist.
///
/// # Returns
///
/// One [`IdentityKey`] per distinct row. A missing file is an empty dataset;
/// missing columns or short rows contribute `""` for the absent part of the
/// key.
///
/// # Errors
///
/// I/O errors other than "not found", and malformed CSV.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_existing_keys(path: &Path) -> Result<HashSet<IdentityKey>> {
    let Some(bytes) = read_dataset(path).await? else {
        debug!("Dataset does not exist yet");
        return Ok(HashSet::new());
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes.as_slice());
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (date_at, event_at, participant_at) =
        (position(DATE), position(EVENT), position(PARTICIPANT));

    let mut keys = HashSet::new();
    for row in reader.records() {
        let row = row?;
        let field = |at: Option<usize>| at.and_then(|i| row.get(i)).unwrap_or("").to_string();
        keys.insert(IdentityKey {
            date: field(date_at),
            event: field(event_at),
            participant: field(participant_at),
        });
    }
    debug!(count = keys.len(), "Loaded existing keys");
    Ok(keys)
}

/// Merge `records` into the dataset at `path`.
///
/// # Arguments
///
/// * `records` - Parsed rows, each carrying `Date` and `Event`.
/// * `path` - The dataset file; created if missing.
/// * `mode` - [`WriteMode::Append`] drops records whose identity is already
///   in the file. [`WriteMode::Rebuild`] replaces the file with this batch.
///
/// # Returns
///
/// How many records were written. In both modes a triple repeated within the
/// batch is written once.
///
/// # Errors
///
/// Any read, write or CSV error. A failed header widening leaves the
/// previous file in place.
#[instrument(level = "info", skip_all, fields(path = %path.display(), ?mode, incoming = records.len()))]
pub async fn accumulate(records: &[ResultRecord], path: &Path, mode: WriteMode) -> Result<usize> {
    if records.is_empty() {
        info!("No results to save");
        return Ok(0);
    }

    let mut seen = match mode {
        WriteMode::Append => load_existing_keys(path).await?,
        WriteMode::Rebuild => HashSet::new(),
    };
    let fresh: Vec<&ResultRecord> = records
        .iter()
        .filter(|r| seen.insert(r.identity()))
        .collect();

    if fresh.is_empty() {
        info!("No new results to add (all duplicates)");
        return Ok(0);
    }

    let existing = match mode {
        WriteMode::Append => read_dataset(path).await?.unwrap_or_default(),
        WriteMode::Rebuild => Vec::new(),
    };
    let batch_columns = fresh.iter().flat_map(|r| r.columns()).collect::<Vec<_>>();

    match read_header(&existing)? {
        None => {
            let header = build_header(batch_columns);
            fs::write(path, to_csv(&header, fresh.iter().copied(), true)?).await?;
        }
        Some(header) if batch_columns.iter().all(|c| header.iter().any(|h| h == c)) => {
            let rows = to_csv(&header, fresh.iter().copied(), false)?;
            let mut file = fs::OpenOptions::new().append(true).open(path).await?;
            file.write_all(&rows).await?;
            file.flush().await?;
        }
        Some(header) => {
            let old_rows = read_records(&existing)?;
            let widened = build_header(
                header
                    .iter()
                    .map(String::as_str)
                    .chain(old_rows.iter().flat_map(ResultRecord::columns))
                    .chain(batch_columns),
            );
            info!(
                added = ?widened.iter().filter(|c| !header.contains(c)).collect::<Vec<_>>(),
                "Widening dataset header"
            );
            let contents = to_csv(&widened, old_rows.iter().chain(fresh.iter().copied()), true)?;
            replace_file(path, &contents).await?;
        }
    }

    info!(written = fresh.len(), "Saved new results");
    Ok(fresh.len())
}

/// Canonical columns first, then every other column once, sorted.
pub fn build_header<'a>(columns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut header: Vec<String> = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(
        columns
            .into_iter()
            .filter(|c| !CANONICAL_COLUMNS.contains(c))
            .unique()
            .sorted()
            .map(str::to_string),
    );
    header
}

/// The dataset's raw bytes, or `None` if there is no file.
async fn read_dataset(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The header row, or `None` for an empty dataset.
fn read_header(contents: &[u8]) -> Result<Option<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(contents);
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    Ok((!header.is_empty()).then_some(header))
}

/// Every data row keyed by the header.
///
/// Cells past the end of the header get a [`positional_column`] name so that
/// rows written under an older, wider layout keep their values.
fn read_records(contents: &[u8]) -> Result<Vec<ResultRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(contents);
    let header = reader.headers()?.clone();
    let rows = reader
        .records()
        .map_ok(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    let column = header
                        .get(i)
                        .map(str::to_string)
                        .unwrap_or_else(|| positional_column(i));
                    (column, cell)
                })
                .collect::<ResultRecord>()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Encode `records` in `header` order, optionally preceded by the header.
fn to_csv<'a>(
    header: &[String],
    records: impl IntoIterator<Item = &'a ResultRecord>,
    with_header: bool,
) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(header)?;
    }
    for record in records {
        writer.write_record(header.iter().map(|column| record.get_or_empty(column)))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
///
/// The temp file is removed again if either step fails.
async fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let written = match fs::write(&tmp, contents).await {
        Ok(()) => fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&tmp).await
            && cleanup.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %tmp.display(), error = %cleanup, "Could not remove temp file");
        }
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
