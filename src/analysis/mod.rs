/// Windowed statistics and plot-ready points for a parameter series.
///
/// `analyze` selects the readings inside `[now - lookback, now]`, computes
/// min / max / mean / trend over every valid (non-missing) reading in that
/// range, and builds the point sequence handed to the chart collaborator.
///
/// Missing values and the point budget only affect the plotted sequence:
/// - a missing reading is plotted at the last known value (leading missing
///   readings, with nothing to carry, are not plotted);
/// - negative values are plotted as zero;
/// - only the newest `window.max_points()` points are plotted.
///
/// None of these touch `SummaryStats`, which always reflects the full window.
///
/// # Clock injection
/// `now` is a parameter rather than read from the system clock, so window
/// selection is deterministic in tests.
///
/// Submodules:
/// - `trend`: least-squares slope and direction labels.

pub mod trend;

use chrono::NaiveDateTime;

use crate::model::{NO_DATA_LABEL, ParameterSeries, Reading, WindowSpec};

pub use trend::{TrendDirection, least_squares_slope};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One point of the plotted sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub timestamp: NaiveDateTime,
    /// Plotted value, never negative.
    pub value: f64,
    /// True when the reading was missing. `value` is then the last known
    /// value, or 0 before the first one.
    pub carried: bool,
}

impl PlotPoint {
    /// Milliseconds since the Unix epoch, treating the local timestamp as
    /// naive. Chart axes take this form.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.and_utc().timestamp_millis()
    }
}

/// A value together with the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub value: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    /// Smallest value; the earliest one on ties.
    pub min: Extremum,
    /// Largest value; the earliest one on ties.
    pub max: Extremum,
    pub mean: f64,
    /// Least-squares slope in value units per hour; `None` with fewer than
    /// two valid readings.
    pub trend_slope: Option<f64>,
    /// Number of valid readings the statistics were computed from.
    pub sample_count: usize,
}

impl SummaryStats {
    pub fn trend(&self) -> TrendDirection {
        TrendDirection::from_slope(self.trend_slope)
    }
}

/// Statistics for a window, or `NoData` when it holds no valid reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Summary {
    Stats(SummaryStats),
    NoData,
}

impl Summary {
    pub fn stats(&self) -> Option<&SummaryStats> {
        match self {
            Summary::Stats(stats) => Some(stats),
            Summary::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Summary::NoData)
    }

    pub fn trend(&self) -> TrendDirection {
        match self {
            Summary::Stats(stats) => stats.trend(),
            Summary::NoData => TrendDirection::NoData,
        }
    }

    /// Display strings: one decimal for values, `NO_DATA_LABEL` throughout
    /// when there is nothing to show.
    pub fn labels(&self) -> SummaryLabels {
        match self {
            Summary::Stats(stats) => SummaryLabels {
                min: format!("{:.1}", stats.min.value),
                max: format!("{:.1}", stats.max.value),
                mean: format!("{:.1}", stats.mean),
                trend: stats.trend().label().to_string(),
            },
            Summary::NoData => SummaryLabels {
                min: NO_DATA_LABEL.to_string(),
                max: NO_DATA_LABEL.to_string(),
                mean: NO_DATA_LABEL.to_string(),
                trend: NO_DATA_LABEL.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLabels {
    pub min: String,
    pub max: String,
    pub mean: String,
    pub trend: String,
}

/// Everything the presentation layer needs for one (series, window) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAnalysis {
    pub param_code: String,
    pub window: WindowSpec,
    pub lower_bound: NaiveDateTime,
    pub upper_bound: NaiveDateTime,
    /// Oldest-first, at most `window.max_points()` long.
    pub points: Vec<PlotPoint>,
    pub summary: Summary,
    /// Readings inside the window, missing ones included.
    pub in_window: usize,
    /// True when older points were dropped to honour the point budget.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub fn analyze(series: &ParameterSeries, window: WindowSpec, now: NaiveDateTime) -> WindowAnalysis {
    let lower_bound = window.lower_bound(now);

    let mut selected: Vec<&Reading> = series
        .readings
        .iter()
        .filter(|r| r.timestamp >= lower_bound && r.timestamp <= now)
        .collect();
    selected.sort_by_key(|r| r.timestamp);

    let summary = summarize(&selected);

    let mut points = plot_points(&selected);
    let max_points = window.max_points();
    let truncated = points.len() > max_points;
    if truncated {
        points = points.split_off(points.len() - max_points);
    }

    WindowAnalysis {
        param_code: series.param_code.clone(),
        window,
        lower_bound,
        upper_bound: now,
        points,
        summary,
        in_window: selected.len(),
        truncated,
    }
}

/// Statistics over the valid readings of an oldest-first selection.
fn summarize(readings: &[&Reading]) -> Summary {
    let samples: Vec<(NaiveDateTime, f64)> = readings
        .iter()
        .filter_map(|r| r.value.filter(|v| v.is_finite()).map(|v| (r.timestamp, v)))
        .collect();

    let Some(&(first_time, first_value)) = samples.first() else {
        return Summary::NoData;
    };

    let mut min = Extremum {
        value: first_value,
        timestamp: first_time,
    };
    let mut max = min;
    let mut sum = 0.0;
    for &(timestamp, value) in &samples {
        if value < min.value {
            min = Extremum { value, timestamp };
        }
        if value > max.value {
            max = Extremum { value, timestamp };
        }
        sum += value;
    }

    Summary::Stats(SummaryStats {
        min,
        max,
        mean: sum / samples.len() as f64,
        trend_slope: least_squares_slope(&samples),
        sample_count: samples.len(),
    })
}

/// Chart points for an oldest-first selection: carry-forward for missing
/// values, negatives clamped to zero. Every reading gets a point; a gap
/// before the first valid value is drawn at zero.
fn plot_points(readings: &[&Reading]) -> Vec<PlotPoint> {
    let mut points = Vec::with_capacity(readings.len());
    let mut last_known = 0.0;

    for reading in readings {
        let (value, carried) = match reading.value.filter(|v| v.is_finite()) {
            Some(value) => {
                let value = value.max(0.0);
                last_known = value;
                (value, false)
            }
            None => (last_known, true),
        };
        points.push(PlotPoint {
            timestamp: reading.timestamp,
            value,
            carried,
        });
    }
    points
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PARAM_PM10;
    use chrono::{Duration, NaiveDate};

    /// A fixed "now" used across all tests: 2024-05-01 13:00:00.
    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap()
    }

    fn hours_ago(hours: i64) -> NaiveDateTime {
        fixed_now() - Duration::hours(hours)
    }

    /// Builds a newest-first series from (hours ago, value) pairs.
    fn series_of(points: &[(i64, Option<f64>)]) -> ParameterSeries {
        let mut series = ParameterSeries::new(PARAM_PM10);
        series.readings = points
            .iter()
            .map(|&(h, value)| Reading {
                timestamp: hours_ago(h),
                value,
            })
            .collect();
        series.readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        series
    }

    // --- Window selection ----------------------------------------------------

    #[test]
    fn test_reading_exactly_at_lower_bound_is_included() {
        let mut series = ParameterSeries::new(PARAM_PM10);
        series.readings = vec![Reading::new(fixed_now() - Duration::days(1), 5.0)];
        let result = analyze(&series, WindowSpec::Day, fixed_now());
        assert_eq!(result.in_window, 1);
        assert!(!result.summary.is_no_data());
    }

    #[test]
    fn test_reading_one_microsecond_before_lower_bound_is_excluded() {
        let mut series = ParameterSeries::new(PARAM_PM10);
        series.readings = vec![Reading::new(
            fixed_now() - Duration::days(1) - Duration::microseconds(1),
            5.0,
        )];
        let result = analyze(&series, WindowSpec::Day, fixed_now());
        assert_eq!(result.in_window, 0);
        assert!(result.summary.is_no_data());
    }

    #[test]
    fn test_readings_after_now_are_excluded() {
        let mut series = ParameterSeries::new(PARAM_PM10);
        series.readings = vec![
            Reading::new(fixed_now() + Duration::seconds(1), 99.0),
            Reading::new(fixed_now(), 1.0),
        ];
        let result = analyze(&series, WindowSpec::Day, fixed_now());
        assert_eq!(result.in_window, 1);
        assert_eq!(result.summary.stats().map(|s| s.max.value), Some(1.0));
    }

    // --- Statistics ----------------------------------------------------------

    #[test]
    fn test_stats_ignore_missing_values() {
        let series = series_of(&[(3, Some(10.0)), (2, None), (1, Some(20.0)), (0, None)]);
        let result = analyze(&series, WindowSpec::Day, fixed_now());
        let stats = result.summary.stats().expect("two valid readings");
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.mean, 15.0, "missing values must not be averaged in as zero");
        assert_eq!(stats.min, Extremum { value: 10.0, timestamp: hours_ago(3) });
        assert_eq!(stats.max, Extremum { value: 20.0, timestamp: hours_ago(1) });
    }

    #[test]
    fn test_stats_use_raw_negative_values() {
        let series = series_of(&[(2, Some(-4.0)), (1, Some(2.0))]);
        let stats = *analyze(&series, WindowSpec::Day, fixed_now()).summary.stats().unwrap();
        assert_eq!(stats.min.value, -4.0);
        assert_eq!(stats.mean, -1.0);
    }

    #[test]
    fn test_all_missing_window_is_no_data_not_zero_mean() {
        let series = series_of(&[(2, None), (1, None)]);
        let result = analyze(&series, WindowSpec::Day, fixed_now());
        assert_eq!(result.summary, Summary::NoData);
        assert_eq!(result.in_window, 2);
        assert!(result.points.iter().all(|p| p.value == 0.0 && p.carried));
        assert_eq!(result.points.len(), 2);
        let labels = result.summary.labels();
        assert_eq!(labels.mean, NO_DATA_LABEL);
        assert_eq!(labels.trend, NO_DATA_LABEL);
    }

    #[test]
    fn test_empty_series_is_no_data() {
        let result = analyze(&ParameterSeries::new(PARAM_PM10), WindowSpec::Year, fixed_now());
        assert!(result.summary.is_no_data());
        assert_eq!(result.summary.trend(), TrendDirection::NoData);
    }

    #[test]
    fn test_single_valid_reading_has_stats_but_no_trend() {
        let series = series_of(&[(1, Some(7.0))]);
        let stats = *analyze(&series, WindowSpec::Day, fixed_now()).summary.stats().unwrap();
        assert_eq!(stats.mean, 7.0);
        assert_eq!(stats.trend_slope, None);
        assert_eq!(stats.trend(), TrendDirection::NoData);
    }

    #[test]
    fn test_trend_labels_follow_slope_sign() {
        let rising = series_of(&[(3, Some(1.0)), (2, Some(2.0)), (1, Some(3.0))]);
        let falling = series_of(&[(3, Some(3.0)), (2, Some(2.0)), (1, Some(1.0))]);
        let flat = series_of(&[(3, Some(2.0)), (2, Some(2.0)), (1, Some(2.0))]);

        let label = |s: &ParameterSeries| analyze(s, WindowSpec::Day, fixed_now()).summary.labels().trend;
        assert_eq!(label(&rising), "increasing");
        assert_eq!(label(&falling), "decreasing");
        assert_eq!(label(&flat), "stable");
    }

    #[test]
    fn test_labels_use_one_decimal() {
        let series = series_of(&[(2, Some(10.04)), (1, Some(20.36))]);
        let labels = analyze(&series, WindowSpec::Day, fixed_now()).summary.labels();
        assert_eq!(labels.min, "10.0");
        assert_eq!(labels.max, "20.4");
        assert_eq!(labels.mean, "15.2");
    }

    // --- Plot points ---------------------------------------------------------

    #[test]
    fn test_points_are_oldest_first_with_carry_forward_and_clamp() {
        let series = series_of(&[(4, None), (3, Some(-2.0)), (2, None), (1, Some(8.0))]);
        let result = analyze(&series, WindowSpec::Day, fixed_now());

        assert_eq!(
            result.points,
            vec![
                PlotPoint { timestamp: hours_ago(4), value: 0.0, carried: true },
                PlotPoint { timestamp: hours_ago(3), value: 0.0, carried: false },
                PlotPoint { timestamp: hours_ago(2), value: 0.0, carried: true },
                PlotPoint { timestamp: hours_ago(1), value: 8.0, carried: false },
            ],
            "leading missing reading is drawn at zero; later gap carries the clamped value"
        );
    }

    #[test]
    fn test_every_missing_reading_in_window_is_plotted() {
        let series = series_of(&[(0, Some(8.0)), (1, None), (2, None)]);
        let result = analyze(&series, WindowSpec::Day, fixed_now());

        assert_eq!(result.in_window, 3);
        assert_eq!(result.points.len(), result.in_window);
        assert_eq!(
            result.points.iter().map(|p| (p.value, p.carried)).collect::<Vec<_>>(),
            vec![(0.0, true), (0.0, true), (8.0, false)]
        );
    }

    #[test]
    fn test_point_budget_truncates_plot_but_not_stats() {
        // One reading per minute: 200 readings against a 168-point budget.
        let mut series = ParameterSeries::new(PARAM_PM10);
        series.readings = (0..200)
            .map(|i| Reading::new(fixed_now() - Duration::minutes(i), i as f64))
            .collect();

        let result = analyze(&series, WindowSpec::Week, fixed_now());
        assert!(result.truncated);
        assert_eq!(result.in_window, 200);
        assert_eq!(result.points.len(), WindowSpec::Week.max_points());
        assert_eq!(
            result.points.last().map(|p| p.timestamp),
            Some(fixed_now()),
            "the newest points are the ones kept"
        );

        let stats = result.summary.stats().expect("valid readings");
        assert_eq!(stats.sample_count, 200);
        assert_eq!(stats.max.value, 199.0, "oldest reading is outside the plot but inside the stats");
        assert_eq!(stats.mean, 99.5);
        assert_eq!(stats.trend(), TrendDirection::Decreasing);
    }

    #[test]
    fn test_timestamp_millis_for_chart_axis() {
        let point = PlotPoint {
            timestamp: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 1).unwrap(),
            value: 1.0,
            carried: false,
        };
        assert_eq!(point.timestamp_millis(), 1000);
    }
}
