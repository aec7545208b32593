/// Core data types for the air-quality station service.
///
/// This module defines the shared domain model imported by all other modules:
/// readings, per-parameter series, station records, the archive collection,
/// analysis windows and the parameter-name reference table. It contains no
/// I/O; merging lives in `merge`, persistence in `archive`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Local-time format used by the GIOŚ API and the archive file,
/// e.g. `"2024-05-01 13:00:00"`.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Label shown wherever a numeric value is unavailable.
pub const NO_DATA_LABEL: &str = "no data";

/// Parses a `DATE_FORMAT` string. Surrounding whitespace is ignored.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(DATE_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Parameter codes
// ---------------------------------------------------------------------------

/// Particulate matter, 10 µm.
pub const PARAM_PM10: &str = "PM10";
/// Particulate matter, 2.5 µm.
pub const PARAM_PM25: &str = "PM2.5";
pub const PARAM_NO2: &str = "NO2";
pub const PARAM_SO2: &str = "SO2";
pub const PARAM_CO: &str = "CO";
pub const PARAM_O3: &str = "O3";
/// Benzene.
pub const PARAM_C6H6: &str = "C6H6";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single timestamped sensor measurement.
///
/// `value == None` means the station reported the slot but no measurement;
/// it is carried through merge and analysis as missing, never as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    pub fn missing(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            value: None,
        }
    }
}

/// Ordered history of readings for one measured parameter.
///
/// Invariant (maintained by `merge`): timestamps are unique and the
/// readings are sorted newest-first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSeries {
    pub param_code: String,
    /// Display name written to the archive, if known.
    pub param_name: Option<String>,
    pub readings: Vec<Reading>,
}

impl ParameterSeries {
    pub fn new(param_code: &str) -> Self {
        Self {
            param_code: param_code.to_string(),
            param_name: None,
            readings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Newest reading, if any.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.first()
    }

    /// Newest value formatted with one decimal, or `NO_DATA_LABEL` when the
    /// series is empty or its newest reading is missing.
    pub fn latest_value_label(&self) -> String {
        match self.latest().and_then(|r| r.value) {
            Some(value) => format!("{:.1}", value),
            None => NO_DATA_LABEL.to_string(),
        }
    }

    /// True when timestamps are strictly decreasing (newest-first, no
    /// duplicates).
    pub fn is_normalized(&self) -> bool {
        self.readings
            .windows(2)
            .all(|pair| pair[0].timestamp > pair[1].timestamp)
    }
}

/// A station's identity plus its per-parameter history.
///
/// `name` is the identity key inside an `Archive`. Parameter codes are
/// unique within `series`; use `series_mut_or_insert` rather than pushing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationRecord {
    pub name: String,
    /// Human-readable location, e.g. `"Kraków, małopolskie"`.
    pub location: String,
    /// Series in first-seen order.
    pub series: Vec<ParameterSeries>,
}

impl StationRecord {
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            series: Vec::new(),
        }
    }

    pub fn series(&self, param_code: &str) -> Option<&ParameterSeries> {
        self.series.iter().find(|s| s.param_code == param_code)
    }

    pub fn series_mut(&mut self, param_code: &str) -> Option<&mut ParameterSeries> {
        self.series.iter_mut().find(|s| s.param_code == param_code)
    }

    /// Returns the series for `param_code`, appending an empty one first if
    /// the record does not have it yet.
    pub fn series_mut_or_insert(&mut self, param_code: &str) -> &mut ParameterSeries {
        let index = match self.series.iter().position(|s| s.param_code == param_code) {
            Some(index) => index,
            None => {
                self.series.push(ParameterSeries::new(param_code));
                self.series.len() - 1
            }
        };
        &mut self.series[index]
    }

    pub fn param_codes(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.param_code.as_str()).collect()
    }
}

/// The durable collection of station histories. Station names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Archive {
    pub stations: Vec<StationRecord>,
}

impl Archive {
    pub fn find(&self, name: &str) -> Option<&StationRecord> {
        self.stations.iter().find(|s| s.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut StationRecord> {
        self.stations.iter_mut().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Analysis windows
// ---------------------------------------------------------------------------

/// Selectable look-back range for analytics and plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowSpec {
    #[default]
    Day,
    Week,
    Month,
    HalfYear,
    Year,
}

impl WindowSpec {
    pub const ALL: [WindowSpec; 5] = [
        WindowSpec::Day,
        WindowSpec::Week,
        WindowSpec::Month,
        WindowSpec::HalfYear,
        WindowSpec::Year,
    ];

    pub fn lookback_days(&self) -> i64 {
        match self {
            WindowSpec::Day => 1,
            WindowSpec::Week => 7,
            WindowSpec::Month => 30,
            WindowSpec::HalfYear => 180,
            WindowSpec::Year => 365,
        }
    }

    pub fn lookback(&self) -> Duration {
        Duration::days(self.lookback_days())
    }

    /// Cap on plotted points: one per hour of the window. Bounds chart
    /// rendering only; statistics always use the full window.
    pub fn max_points(&self) -> usize {
        24 * self.lookback_days() as usize
    }

    /// Inclusive lower bound of the window ending at `now`.
    pub fn lower_bound(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - self.lookback()
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowSpec::Day => "day",
            WindowSpec::Week => "week",
            WindowSpec::Month => "month",
            WindowSpec::HalfYear => "half-year",
            WindowSpec::Year => "year",
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time window '{0}' (expected day, week, month, half-year or year)")]
pub struct UnknownWindow(pub String);

impl FromStr for WindowSpec {
    type Err = UnknownWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "24h" => Ok(WindowSpec::Day),
            "week" | "7d" => Ok(WindowSpec::Week),
            "month" | "30d" => Ok(WindowSpec::Month),
            "half-year" | "halfyear" | "half_year" | "180d" => Ok(WindowSpec::HalfYear),
            "year" | "365d" => Ok(WindowSpec::Year),
            _ => Err(UnknownWindow(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter names
// ---------------------------------------------------------------------------

/// Immutable parameter-code → display-name table.
///
/// Loaded once from configuration and cloned into whatever needs it; there
/// is no global instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterNames(BTreeMap<String, String>);

impl ParameterNames {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self(names)
    }

    /// Display name for `code`, falling back to the code itself.
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.0.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.0.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Default for ParameterNames {
    /// Names published by GIOŚ for the parameters its stations report.
    fn default() -> Self {
        let names = [
            (PARAM_PM10, "Pył zawieszony PM10"),
            (PARAM_PM25, "Pył zawieszony PM2.5"),
            (PARAM_NO2, "Dwutlenek azotu"),
            (PARAM_SO2, "Dwutlenek siarki"),
            (PARAM_CO, "Tlenek węgla"),
            (PARAM_O3, "Ozon"),
            (PARAM_C6H6, "Benzen"),
        ];
        Self(
            names
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_timestamp_round_trips_through_date_format() {
        let ts = parse_timestamp("2024-05-01 13:00:00").expect("valid date");
        assert_eq!(ts, at(13));
        assert_eq!(format_timestamp(&ts), "2024-05-01 13:00:00");
    }

    #[test]
    fn test_iso_timestamp_is_rejected() {
        assert!(parse_timestamp("2024-05-01T13:00:00").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_window_lookbacks_and_point_budgets() {
        let expected = [
            (WindowSpec::Day, 1, 24),
            (WindowSpec::Week, 7, 168),
            (WindowSpec::Month, 30, 720),
            (WindowSpec::HalfYear, 180, 4320),
            (WindowSpec::Year, 365, 8760),
        ];
        for (window, days, points) in expected {
            assert_eq!(window.lookback(), Duration::days(days), "{}", window);
            assert_eq!(window.max_points(), points, "{}", window);
        }
    }

    #[test]
    fn test_window_parses_from_name() {
        for window in WindowSpec::ALL {
            assert_eq!(window.name().parse::<WindowSpec>(), Ok(window));
        }
        assert_eq!(" Week ".parse::<WindowSpec>(), Ok(WindowSpec::Week));
        assert!("fortnight".parse::<WindowSpec>().is_err());
    }

    #[test]
    fn test_latest_value_label() {
        let mut series = ParameterSeries::new(PARAM_PM10);
        assert_eq!(series.latest_value_label(), NO_DATA_LABEL);

        series.readings = vec![Reading::new(at(2), 21.04), Reading::new(at(1), 30.0)];
        assert_eq!(series.latest_value_label(), "21.0");

        series.readings.insert(0, Reading::missing(at(3)));
        assert_eq!(
            series.latest_value_label(),
            NO_DATA_LABEL,
            "a missing newest reading must not fall back to an older value"
        );
    }

    #[test]
    fn test_is_normalized_detects_order_and_duplicates() {
        let mut series = ParameterSeries::new(PARAM_NO2);
        series.readings = vec![Reading::new(at(3), 1.0), Reading::new(at(1), 2.0)];
        assert!(series.is_normalized());

        series.readings = vec![Reading::new(at(1), 1.0), Reading::new(at(3), 2.0)];
        assert!(!series.is_normalized());

        series.readings = vec![Reading::new(at(1), 1.0), Reading::new(at(1), 2.0)];
        assert!(!series.is_normalized());
    }

    #[test]
    fn test_series_mut_or_insert_keeps_codes_unique() {
        let mut record = StationRecord::new("Kraków, Aleja Krasińskiego", "Kraków, małopolskie");
        record.series_mut_or_insert(PARAM_PM10);
        record.series_mut_or_insert(PARAM_NO2);
        record.series_mut_or_insert(PARAM_PM10);
        assert_eq!(record.param_codes(), vec![PARAM_PM10, PARAM_NO2]);
    }

    #[test]
    fn test_parameter_names_fall_back_to_code() {
        let names = ParameterNames::default();
        assert_eq!(names.display_name(PARAM_O3), "Ozon");
        assert_eq!(names.display_name("NH3"), "NH3");
        assert_eq!(names.len(), 7);
    }
}
