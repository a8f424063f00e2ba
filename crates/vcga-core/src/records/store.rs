use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{errors::Error, records::record::Record, Result};

/// In-memory index from identifier to record, built eagerly from snapshot files.
///
/// Matriculas and HDs share one key space; a later file (or a later row) with the
/// same key replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    records: HashMap<String, Record>,
}

impl RecordStore {
    /// Load every readable snapshot in order.
    ///
    /// Missing files are skipped quietly; malformed rows are skipped with a warning.
    /// Fails when no file could be read or when no valid record came out of them.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut records = HashMap::new();
        let mut readable = 0usize;

        for path in paths {
            let file = match File::open(path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "snapshot not present");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "snapshot not readable");
                    continue;
                }
            };
            readable += 1;
            let added = read_snapshot(file, path, &mut records);
            info!(path = %path.display(), rows = added, "snapshot loaded");
        }

        if readable == 0 {
            return Err(Error::Load(format!(
                "none of the {} snapshot files is readable",
                paths.len()
            )));
        }
        if records.is_empty() {
            return Err(Error::Load(format!(
                "{readable} snapshot files read but no valid record found"
            )));
        }

        Ok(Self { records })
    }

    /// Build a store from `(key, record)` pairs, applying the same key and record
    /// normalization as the snapshot loader.
    pub fn from_records(rows: impl IntoIterator<Item = (String, Record)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(key, rec)| (normalize_key(&key), rec.normalized()))
            .filter(|(key, rec)| !key.is_empty() && rec.has_identifier())
            .collect();
        Self { records }
    }

    /// Matricula keys match as-is, HD keys case-insensitively.
    pub fn lookup(&self, key: &str) -> Option<&Record> {
        self.records.get(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Matriculas (all digits) stay as-is; anything else is an HD and gets upper-cased.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.chars().all(|c| c.is_ascii_digit()) {
        key.to_string()
    } else {
        key.to_uppercase()
    }
}

/// Write `(key, record)` rows in the snapshot format: fully quoted `key,json` lines.
pub fn write_snapshot(path: &Path, rows: &[(String, Record)]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path)
        .map_err(csv_error)?;

    for (key, record) in rows {
        let payload = serde_json::to_string(record)?;
        writer
            .write_record([key.as_str(), payload.as_str()])
            .map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse one snapshot into `into`. Returns the number of rows indexed.
fn read_snapshot<R: Read>(reader: R, source: &Path, into: &mut HashMap<String, Record>) -> usize {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut added = 0usize;
    for (idx, row) in rdr.records().enumerate() {
        let line = idx + 1;
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %source.display(), line, error = %e, "skipping unreadable row");
                continue;
            }
        };
        if row.len() != 2 {
            warn!(
                path = %source.display(),
                line,
                columns = row.len(),
                "skipping row with wrong column count"
            );
            continue;
        }

        let key = normalize_key(&row[0]);
        if key.is_empty() {
            warn!(path = %source.display(), line, "skipping row with empty key");
            continue;
        }

        let record = match serde_json::from_str::<Record>(&row[1]) {
            Ok(r) => r.normalized(),
            Err(e) => {
                warn!(path = %source.display(), line, key = %key, error = %e, "skipping row with invalid JSON");
                continue;
            }
        };
        if !record.has_identifier() {
            warn!(path = %source.display(), line, key = %key, "skipping record without HD or matricula");
            continue;
        }

        into.insert(key, record);
        added += 1;
    }
    added
}

fn csv_error(e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::External(format!("csv error: {other:?}")),
    }
}
