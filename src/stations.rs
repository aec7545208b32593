/// Station catalog for the air-quality browser.
///
/// Holds the station list fetched from GIOŚ (`ingest::gios::fetch_stations`)
/// and answers the two searches the browser offers: city-name text search
/// and radius search around a geocoded point. Also places every station
/// with coordinates on the map canvas.
///
/// The catalog is read-only once built; a refresh builds a new one.

use crate::geo::{self, GeoPoint, MapBounds};

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single monitoring station.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// GIOŚ station id.
    pub id: u32,
    /// Official station name, e.g. "Kraków, Aleja Krasińskiego".
    pub name: String,
    /// City the station is registered under. A handful of rural stations
    /// have none and never match a city search.
    pub city: Option<String>,
    pub commune: String,
    pub province: String,
    /// WGS84 position; `None` when the API sent unparsable coordinates.
    pub coordinates: Option<GeoPoint>,
}

impl Station {
    /// `"commune, province"`, the location stored with archived records.
    pub fn location(&self) -> String {
        format!("{}, {}", self.commune, self.province)
    }
}

/// A radius-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation<'a> {
    pub station: &'a Station,
    pub distance_km: f64,
}

/// A station projected onto the map canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub station_id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn find(&self, id: u32) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Stations whose city contains `text`, ignoring case and surrounding
    /// whitespace. Empty text matches every station that has a city.
    pub fn search_by_city(&self, text: &str) -> Vec<&Station> {
        let needle = text.trim().to_lowercase();
        self.stations
            .iter()
            .filter(|s| {
                s.city
                    .as_deref()
                    .is_some_and(|city| city.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Stations within `radius_km` of `origin` (inclusive), in catalog order.
    pub fn within_radius(&self, origin: GeoPoint, radius_km: f64) -> Vec<NearbyStation<'_>> {
        self.stations
            .iter()
            .filter_map(|station| {
                let distance_km = geo::distance_km(origin, station.coordinates?);
                (distance_km <= radius_km).then_some(NearbyStation {
                    station,
                    distance_km,
                })
            })
            .collect()
    }

    /// Map markers for every station with coordinates.
    pub fn markers(&self, bounds: &MapBounds) -> Vec<MapMarker> {
        self.stations
            .iter()
            .filter_map(|station| {
                let (x, y) = geo::project(station.coordinates?, bounds);
                Some(MapMarker {
                    station_id: station.id,
                    name: station.name.clone(),
                    x,
                    y,
                })
            })
            .collect()
    }
}

/// The radius to search with: `input` when it is a positive finite number,
/// otherwise `default_km`.
pub fn effective_radius(input: Option<f64>, default_km: f64) -> f64 {
    match input {
        Some(r) if r.is_finite() && r > 0.0 => r,
        _ => default_km,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
