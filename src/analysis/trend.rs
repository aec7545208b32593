//! Least-squares trend over a window of valid readings.

use std::fmt;

use chrono::NaiveDateTime;

use crate::model::NO_DATA_LABEL;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Ordinary least-squares slope of value over time, in value units per hour.
///
/// Needs at least two samples at distinct timestamps; otherwise `None`.
/// Samples may be in any order.
pub fn least_squares_slope(samples: &[(NaiveDateTime, f64)]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let (origin, y0) = samples[0];
    let xs: Vec<f64> = samples
        .iter()
        .map(|(t, _)| (*t - origin).num_milliseconds() as f64 / MILLIS_PER_HOUR)
        .collect();
    let n = samples.len() as f64;
    let x_mean = xs.iter().sum::<f64>() / n;

    // Deviations are taken from the first value rather than the mean; the
    // centred x makes this equivalent and a constant series gives exactly 0.
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, (_, y)) in xs.iter().zip(samples) {
        let dx = x - x_mean;
        sxy += dx * (y - y0);
        sxx += dx * dx;
    }

    if sxx == 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Direction of a trend slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    NoData,
}

impl TrendDirection {
    pub fn from_slope(slope: Option<f64>) -> Self {
        match slope {
            Some(s) if s > 0.0 => TrendDirection::Increasing,
            Some(s) if s < 0.0 => TrendDirection::Decreasing,
            Some(_) => TrendDirection::Stable,
            None => TrendDirection::NoData,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::NoData => NO_DATA_LABEL,
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
