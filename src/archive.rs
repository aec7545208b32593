//! File-backed station archive.
//!
//! The archive is a single pretty-printed JSON document:
//!
//! ```text
//! { "stations": [
//!   { "stationName": "...", "location": "...",
//!     "sensors": [
//!       { "paramCode": "PM10", "paramName": "...", "latestValue": "21.0",
//!         "historicalData": [ { "date": "2024-05-01 13:00:00", "value": 21.04 }, ... ] } ] } ] }
//! ```
//!
//! `load` never fails: an absent, unreadable, unparsable or foreign file is
//! an empty archive. `save` is a read-modify-write that merges the incoming
//! record through `merge::merge_station`, holds a per-path lock for the
//! whole cycle, and replaces the file by writing a temporary sibling and
//! renaming it over the target.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::logging::{self, DataSource};
use crate::merge::{self, MergeSummary};
use crate::model::{format_timestamp, parse_timestamp, Archive, Reading, StationRecord};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not serialize archive for {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ArchiveError {
    /// The file or directory the failed operation targeted.
    pub fn path(&self) -> &str {
        match self {
            ArchiveError::Io { path, .. } | ArchiveError::Serialize { path, .. } => path,
        }
    }
}

/// Why an existing archive file could not be used as-is.
#[derive(Debug, thiserror::Error)]
pub(crate) enum LoadProblem {
    #[error("archive file does not exist")]
    Missing,
    #[error("archive file is unreadable: {0}")]
    Unreadable(#[source] io::Error),
    #[error("archive file is not valid JSON: {0}")]
    Unparsable(#[source] serde_json::Error),
    #[error("archive file has an unrecognised layout: {0}")]
    ForeignSchema(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// On-disk layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ArchiveFile {
    pub stations: Vec<StationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StationEntry {
    pub station_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sensors: Vec<SensorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SensorEntry {
    pub param_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    #[serde(default)]
    pub latest_value: String,
    #[serde(default)]
    pub historical_data: Vec<HistoricalPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoricalPoint {
    pub date: String,
    /// `null` on disk for a slot without a measurement. Kept as raw JSON so
    /// one hand-edited value costs a single reading, not the whole file.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl HistoricalPoint {
    fn from_reading(reading: &Reading) -> Self {
        Self {
            date: format_timestamp(&reading.timestamp),
            value: reading.value.map_or(serde_json::Value::Null, serde_json::Value::from),
        }
    }

    /// `Some(None)` for an empty slot, `None` when the value is not a number.
    pub(crate) fn measurement(&self) -> Option<Option<f64>> {
        match &self.value {
            serde_json::Value::Null => Some(None),
            serde_json::Value::Number(n) => n.as_f64().map(Some),
            _ => None,
        }
    }
}

/// Reads and structurally decodes the file at `path` without repairing it.
pub(crate) fn read_file(path: &Path) -> Result<ArchiveFile, LoadProblem> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadProblem::Missing),
        Err(e) => return Err(LoadProblem::Unreadable(e)),
    };

    let value: serde_json::Value = serde_json::from_str(&text).map_err(LoadProblem::Unparsable)?;
    serde_json::from_value(value).map_err(LoadProblem::ForeignSchema)
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn into_archive(file: ArchiveFile, subject: &str) -> Archive {
    let mut archive = Archive::default();
    for entry in file.stations {
        let record = into_record(entry, subject);
        match archive.find_mut(&record.name) {
            Some(existing) => {
                logging::warn(
                    DataSource::Archive,
                    Some(subject),
                    &format!("Duplicate station '{}' folded into its first entry", record.name),
                );
                merge::merge_station(existing, &record);
            }
            None => archive.stations.push(record),
        }
    }
    archive
}

fn into_record(entry: StationEntry, subject: &str) -> StationRecord {
    let mut record = StationRecord::new(&entry.station_name, &entry.location);

    for sensor in entry.sensors {
        let mut readings = Vec::with_capacity(sensor.historical_data.len());
        let mut bad_dates = 0usize;
        let mut bad_values = 0usize;
        for point in &sensor.historical_data {
            match (parse_timestamp(&point.date), point.measurement()) {
                (Some(timestamp), Some(value)) => readings.push(Reading { timestamp, value }),
                (None, _) => bad_dates += 1,
                (Some(_), None) => bad_values += 1,
            }
        }
        if bad_dates > 0 {
            logging::warn(
                DataSource::Archive,
                Some(subject),
                &format!(
                    "{} / {}: dropped {} reading(s) with unparsable dates",
                    entry.station_name, sensor.param_code, bad_dates
                ),
            );
        }
        if bad_values > 0 {
            logging::warn(
                DataSource::Archive,
                Some(subject),
                &format!(
                    "{} / {}: dropped {} reading(s) with non-numeric values",
                    entry.station_name, sensor.param_code, bad_values
                ),
            );
        }

        let seen_before = record.series(&sensor.param_code).is_some();
        let series = record.series_mut_or_insert(&sensor.param_code);
        if sensor.param_name.is_some() {
            series.param_name = sensor.param_name;
        }

        if seen_before {
            logging::warn(
                DataSource::Archive,
                Some(subject),
                &format!(
                    "{}: duplicate sensor entry for {} merged",
                    entry.station_name, sensor.param_code
                ),
            );
            merge::merge_into(series, &readings);
        } else {
            series.readings = readings;
            if !series.is_normalized() {
                logging::warn(
                    DataSource::Archive,
                    Some(subject),
                    &format!(
                        "{} / {}: history re-sorted newest-first",
                        entry.station_name, series.param_code
                    ),
                );
                *series = merge::normalize(series);
            }
        }
    }
    record
}

fn to_file(archive: &Archive) -> ArchiveFile {
    ArchiveFile {
        stations: archive.stations.iter().map(to_entry).collect(),
    }
}

fn to_entry(record: &StationRecord) -> StationEntry {
    StationEntry {
        station_name: record.name.clone(),
        location: record.location.clone(),
        sensors: record
            .series
            .iter()
            .map(|series| SensorEntry {
                param_code: series.param_code.clone(),
                param_name: series.param_name.clone(),
                latest_value: series.latest_value_label(),
                historical_data: series
                    .readings
                    .iter()
                    .map(HistoricalPoint::from_reading)
                    .collect(),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Loads the archive at `path`, repairing duplicates and ordering.
///
/// Returns an empty archive when the file is absent, unreadable, not JSON,
/// or JSON of some other shape.
pub fn load(path: &Path) -> Archive {
    let subject = path.display().to_string();
    match read_file(path) {
        Ok(file) => into_archive(file, &subject),
        Err(LoadProblem::Missing) => Archive::default(),
        Err(problem) => {
            logging::warn(
                DataSource::Archive,
                Some(&subject),
                &format!("{}; treating as empty archive", problem),
            );
            Archive::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    /// The station was new to the archive.
    Appended,
    /// The station existed and the incoming series were merged into it.
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub action: SaveAction,
    pub summary: MergeSummary,
}

/// Merges `record` into the archive at `path` and rewrites the file.
///
/// Saves to the same path are serialized within the process. On error the
/// existing file is left untouched.
pub fn save(path: &Path, record: &StationRecord) -> Result<SaveOutcome, ArchiveError> {
    let lock = path_lock(path);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let subject = path.display().to_string();
    let mut archive = match read_file(path) {
        Ok(file) => into_archive(file, &subject),
        Err(LoadProblem::Missing) => Archive::default(),
        // Overwriting a file we could not read would lose whatever it holds.
        Err(LoadProblem::Unreadable(source)) => {
            return Err(ArchiveError::Io {
                path: subject,
                source,
            });
        }
        Err(problem) => {
            logging::warn(
                DataSource::Archive,
                Some(&subject),
                &format!("{}; replacing with a new archive", problem),
            );
            Archive::default()
        }
    };

    let action = if archive.find(&record.name).is_some() {
        SaveAction::Merged
    } else {
        // Appending through merge_station keeps the stored copy normalized.
        archive
            .stations
            .push(StationRecord::new(&record.name, &record.location));
        SaveAction::Appended
    };
    let summary = match archive.find_mut(&record.name) {
        Some(existing) => merge::merge_station(existing, record),
        None => MergeSummary::default(),
    };

    write_atomic(path, &to_file(&archive))?;

    logging::info(
        DataSource::Archive,
        Some(&subject),
        &format!(
            "Saved '{}' ({:?}): {} new, {} replaced, {} readings total",
            record.name, action, summary.inserted, summary.replaced, summary.total
        ),
    );

    Ok(SaveOutcome { action, summary })
}

/// One lock per archive file, shared by every save in the process.
///
/// Entries live for the whole process. A service keeps one archive (or a
/// handful), so the table stays as small as the set of files it touches.
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Sequence for temporary file names, unique within the process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Identifies the file `path` names, however it is spelled.
///
/// The parent directory is canonicalized so `..`, `.` and symlinked
/// directories collapse to one key. A parent that does not exist yet falls
/// back to the absolute form.
fn lock_key(path: &Path) -> PathBuf {
    let canonical = path.file_name().and_then(|name| {
        fs::canonicalize(parent_dir(path))
            .ok()
            .map(|parent| parent.join(name))
    });
    canonical
        .or_else(|| std::path::absolute(path).ok())
        .unwrap_or_else(|| path.to_path_buf())
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = lock_key(path);
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

fn write_atomic(path: &Path, file: &ArchiveFile) -> Result<(), ArchiveError> {
    let json = serde_json::to_string_pretty(file).map_err(|source| ArchiveError::Serialize {
        path: path.display().to_string(),
        source,
    })?;

    let file_name = path.file_name().ok_or_else(|| ArchiveError::Io {
        path: path.display().to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "archive path has no file name"),
    })?;

    let parent = parent_dir(path);
    fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
        path: parent.display().to_string(),
        source,
    })?;

    let tmp_path = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let written = fs::File::create(&tmp_path).and_then(|mut tmp| {
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.sync_all()
    });
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(ArchiveError::Io {
            path: tmp_path.display().to_string(),
            source,
        });
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        ArchiveError::Io {
            path: path.display().to_string(),
            source,
        }
    })
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

/// An archive bound to one file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStore {
    path: PathBuf,
}

impl ArchiveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Archive {
        load(&self.path)
    }

    pub fn save(&self, record: &StationRecord) -> Result<SaveOutcome, ArchiveError> {
        save(&self.path, record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
