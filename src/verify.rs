//! Archive Verification Module
//!
//! Inspects an archive file exactly as it sits on disk, without the
//! repairs `archive::load` applies, and reports every deviation from the
//! layout `archive::save` writes. Useful before trusting a hand-edited or
//! copied archive, and for diagnosing why `load` logged warnings.

use std::collections::HashSet;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::archive::{self, LoadProblem};
use crate::model::parse_timestamp;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArchiveReport {
    pub path: String,
    pub checked_at: String,
    pub status: VerificationStatus,
    pub station_count: usize,
    pub series_count: usize,
    pub reading_count: usize,
    pub issues: Vec<ArchiveIssue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum VerificationStatus {
    /// File matches the saved layout exactly.
    Success,
    /// File is usable; `load` will repair the listed issues.
    PartialSuccess,
    /// File cannot be used; `load` will treat it as an empty archive.
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveIssue {
    Missing,
    Unreadable { error: String },
    Unparsable { error: String },
    ForeignSchema { error: String },
    DuplicateStation { station: String },
    DuplicateParameter { station: String, param_code: String },
    BadDates { station: String, param_code: String, count: usize },
    BadValues { station: String, param_code: String, count: usize },
    DuplicateTimestamps { station: String, param_code: String, count: usize },
    NotNewestFirst { station: String, param_code: String },
}

impl ArchiveIssue {
    /// Issues that make the whole file unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveIssue::Missing
                | ArchiveIssue::Unreadable { .. }
                | ArchiveIssue::Unparsable { .. }
                | ArchiveIssue::ForeignSchema { .. }
        )
    }
}

// ============================================================================
// Verification
// ============================================================================

pub fn verify_archive(path: &Path) -> ArchiveReport {
    let mut report = ArchiveReport {
        path: path.display().to_string(),
        checked_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        status: VerificationStatus::Failed,
        station_count: 0,
        series_count: 0,
        reading_count: 0,
        issues: Vec::new(),
    };

    let file = match archive::read_file(path) {
        Ok(file) => file,
        Err(problem) => {
            report.issues.push(match problem {
                LoadProblem::Missing => ArchiveIssue::Missing,
                LoadProblem::Unreadable(e) => ArchiveIssue::Unreadable { error: e.to_string() },
                LoadProblem::Unparsable(e) => ArchiveIssue::Unparsable { error: e.to_string() },
                LoadProblem::ForeignSchema(e) => ArchiveIssue::ForeignSchema { error: e.to_string() },
            });
            return report;
        }
    };

    let mut station_names = HashSet::new();
    for station in &file.stations {
        report.station_count += 1;
        if !station_names.insert(station.station_name.as_str()) {
            report.issues.push(ArchiveIssue::DuplicateStation {
                station: station.station_name.clone(),
            });
        }

        let mut param_codes = HashSet::new();
        for sensor in &station.sensors {
            report.series_count += 1;
            report.reading_count += sensor.historical_data.len();

            if !param_codes.insert(sensor.param_code.as_str()) {
                report.issues.push(ArchiveIssue::DuplicateParameter {
                    station: station.station_name.clone(),
                    param_code: sensor.param_code.clone(),
                });
            }

            let timestamps: Vec<Option<NaiveDateTime>> = sensor
                .historical_data
                .iter()
                .map(|p| parse_timestamp(&p.date))
                .collect();
            let valid: Vec<NaiveDateTime> = timestamps.iter().flatten().copied().collect();

            let bad = timestamps.len() - valid.len();
            if bad > 0 {
                report.issues.push(ArchiveIssue::BadDates {
                    station: station.station_name.clone(),
                    param_code: sensor.param_code.clone(),
                    count: bad,
                });
            }

            let bad_values = sensor
                .historical_data
                .iter()
                .filter(|p| p.measurement().is_none())
                .count();
            if bad_values > 0 {
                report.issues.push(ArchiveIssue::BadValues {
                    station: station.station_name.clone(),
                    param_code: sensor.param_code.clone(),
                    count: bad_values,
                });
            }

            let distinct: HashSet<&NaiveDateTime> = valid.iter().collect();
            let duplicates = valid.len() - distinct.len();
            if duplicates > 0 {
                report.issues.push(ArchiveIssue::DuplicateTimestamps {
                    station: station.station_name.clone(),
                    param_code: sensor.param_code.clone(),
                    count: duplicates,
                });
            }

            if valid.windows(2).any(|pair| pair[0] < pair[1]) {
                report.issues.push(ArchiveIssue::NotNewestFirst {
                    station: station.station_name.clone(),
                    param_code: sensor.param_code.clone(),
                });
            }
        }
    }

    report.status = if report.issues.is_empty() {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    };
    report
}

// ============================================================================
// Tests
// ============================================================================
