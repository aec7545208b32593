//! Great-circle distance and map projection for station placement.
//!
//! Stateless. Coordinates are WGS84 degrees and are not range-checked:
//! out-of-range input simply produces out-of-canvas coordinates.

use std::f64::consts::FRAC_PI_4;

use serde::Deserialize;

/// Mean Earth radius used for both distance and the Mercator axis.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance between two points, in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Geographic box mapped onto a pixel canvas of `width` × `height`.
///
/// Defaults cover Poland on a 600 × 465 canvas.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for MapBounds {
    fn default() -> Self {
        Self {
            lat_min: 49.09,
            lat_max: 54.61,
            lon_min: 14.24,
            lon_max: 22.59,
            width: 600.0,
            height: 465.0,
        }
    }
}

/// Mercator northing for `lat` degrees, in kilometres.
pub fn mercator_y(lat: f64) -> f64 {
    EARTH_RADIUS_KM * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln()
}

/// Canvas position of `point`: equirectangular x, Mercator y, with (0, 0)
/// at the north-west corner of `bounds`.
pub fn project(point: GeoPoint, bounds: &MapBounds) -> (f64, f64) {
    let x = (point.lon - bounds.lon_min) / (bounds.lon_max - bounds.lon_min) * bounds.width;

    let top = mercator_y(bounds.lat_max);
    let bottom = mercator_y(bounds.lat_min);
    let y = (top - mercator_y(point.lat)) / (top - bottom) * bounds.height;

    (x, y)
}
