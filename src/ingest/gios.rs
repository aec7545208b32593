/// GIOŚ (Główny Inspektorat Ochrony Środowiska) Air Quality API Client
///
/// Retrieves the national station list, the sensors installed at each
/// station, and hourly readings per sensor from the GIOŚ REST API.
///
/// API Documentation: https://powietrze.gios.gov.pl/pjp/content/api
/// Endpoints used:
///   - `station/findAll`
///   - `station/sensors/{stationId}`
///   - `data/getData/{sensorId}`

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{batch, get_text, IngestError};
use crate::config::GiosConfig;
use crate::geo::GeoPoint;
use crate::model::Reading;
use crate::stations::Station;

// ============================================================================
// GIOŚ API Response Structures
// ============================================================================

/// Entry of `station/findAll`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosStation {
    pub id: u32,
    pub station_name: String,
    /// Decimal degrees, sent as a string ("50.057678")
    #[serde(default)]
    pub gegr_lat: Value,
    #[serde(default)]
    pub gegr_lon: Value,
    pub city: Option<GiosCity>,
    pub address_street: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GiosCity {
    pub id: Option<u32>,
    pub name: String,
    pub commune: Option<GiosCommune>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosCommune {
    pub commune_name: Option<String>,
    pub district_name: Option<String>,
    pub province_name: Option<String>,
}

/// Entry of `station/sensors/{id}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosSensor {
    pub id: u32,
    pub station_id: Option<u32>,
    pub param: GiosParam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiosParam {
    pub param_name: Option<String>,
    pub param_formula: Option<String>,
    pub param_code: String,
    pub id_param: Option<u32>,
}

/// A sensor as the rest of the crate sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub id: u32,
    pub param_code: String,
    pub param_name: Option<String>,
}

// ============================================================================
// URL Builders
// ============================================================================

pub fn stations_url(base_url: &str) -> String {
    format!("{}/station/findAll", base_url.trim_end_matches('/'))
}

pub fn sensors_url(base_url: &str, station_id: u32) -> String {
    format!("{}/station/sensors/{}", base_url.trim_end_matches('/'), station_id)
}

pub fn readings_url(base_url: &str, sensor_id: u32) -> String {
    format!("{}/data/getData/{}", base_url.trim_end_matches('/'), sensor_id)
}

// ============================================================================
// Parsing
// ============================================================================

/// Accepts either a JSON number or a numeric string.
fn coordinate(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn into_station(raw: GiosStation) -> Station {
    let coordinates = match (coordinate(&raw.gegr_lat), coordinate(&raw.gegr_lon)) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    };

    let commune = raw.city.as_ref().and_then(|c| c.commune.as_ref());
    Station {
        id: raw.id,
        name: raw.station_name,
        commune: commune
            .and_then(|c| c.commune_name.clone())
            .unwrap_or_default(),
        province: commune
            .and_then(|c| c.province_name.clone())
            .unwrap_or_default(),
        city: raw.city.map(|c| c.name),
        coordinates,
    }
}

/// Parse the `station/findAll` response
pub fn parse_stations(json: &str) -> Result<Vec<Station>, IngestError> {
    let raw: Vec<GiosStation> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(into_station).collect())
}

/// Parse the `station/sensors/{id}` response
pub fn parse_sensors(json: &str) -> Result<Vec<Sensor>, IngestError> {
    let raw: Vec<GiosSensor> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|s| Sensor {
            id: s.id,
            param_code: s.param.param_code,
            param_name: s.param.param_name,
        })
        .collect())
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Build the blocking client used for every GIOŚ request
pub fn build_client(config: &GiosConfig) -> Result<reqwest::blocking::Client, IngestError> {
    Ok(reqwest::blocking::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Fetch the full station list
pub fn fetch_stations(
    client: &reqwest::blocking::Client,
    base_url: &str,
) -> Result<Vec<Station>, IngestError> {
    let body = get_text(client, &stations_url(base_url))?;
    let stations = parse_stations(&body)?;
    if stations.is_empty() {
        return Err(IngestError::NoData("station list is empty".to_string()));
    }
    Ok(stations)
}

/// Fetch the sensors installed at one station
pub fn fetch_sensors(
    client: &reqwest::blocking::Client,
    base_url: &str,
    station_id: u32,
) -> Result<Vec<Sensor>, IngestError> {
    let body = get_text(client, &sensors_url(base_url, station_id))?;
    let sensors = parse_sensors(&body)?;
    if sensors.is_empty() {
        return Err(IngestError::NoData(format!(
            "station {} reports no sensors",
            station_id
        )));
    }
    Ok(sensors)
}

/// Fetch the recent readings of one sensor
///
/// An empty series is `IngestError::NoData` so the caller can tell "sensor
/// silent" apart from a successful fetch.
pub fn fetch_readings(
    client: &reqwest::blocking::Client,
    base_url: &str,
    sensor_id: u32,
) -> Result<Vec<Reading>, IngestError> {
    let body = get_text(client, &readings_url(base_url, sensor_id))?;
    let readings = batch::parse_readings(&body)?;
    if readings.is_empty() {
        return Err(IngestError::NoData(format!(
            "sensor {} returned an empty series",
            sensor_id
        )));
    }
    Ok(readings)
}

// ============================================================================
// Tests
// ============================================================================
