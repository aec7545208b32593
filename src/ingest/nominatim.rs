/// OpenStreetMap Nominatim geocoding for the radius search.
///
/// Turns the free-text location typed by the user into a single point.
/// Nominatim's usage policy requires an identifying User-Agent, so use the
/// client from `gios::build_client`.

use serde::Deserialize;

use super::{get_text, IngestError};
use crate::geo::GeoPoint;

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

/// `{base}/search?q=<query>&format=json&limit=1`, percent-encoded.
pub fn search_url(base_url: &str, query: &str) -> Result<String, IngestError> {
    let endpoint = format!("{}/search", base_url.trim_end_matches('/'));
    let url = reqwest::Url::parse_with_params(
        &endpoint,
        &[("q", query.trim()), ("format", "json"), ("limit", "1")],
    )
    .map_err(|e| IngestError::Request(format!("invalid geocoder URL {}: {}", endpoint, e)))?;
    Ok(url.into())
}

/// First hit of a search response, or `None` when there is no usable hit.
pub fn parse_search_response(json: &str) -> Option<GeoPoint> {
    let hits: Vec<SearchHit> = serde_json::from_str(json).ok()?;
    let hit = hits.into_iter().next()?;
    let lat = hit.lat.trim().parse::<f64>().ok()?;
    let lon = hit.lon.trim().parse::<f64>().ok()?;
    (lat.is_finite() && lon.is_finite()).then(|| GeoPoint::new(lat, lon))
}

/// Rejects queries shorter than `min_len` characters after trimming.
pub fn check_query(query: &str, min_len: usize) -> Result<(), IngestError> {
    if query.trim().chars().count() < min_len {
        return Err(IngestError::QueryTooShort { min: min_len });
    }
    Ok(())
}

/// Geocode `query`. No request is sent when the query is too short.
pub fn geocode(
    client: &reqwest::blocking::Client,
    base_url: &str,
    query: &str,
    min_len: usize,
) -> Result<GeoPoint, IngestError> {
    check_query(query, min_len)?;
    let body = get_text(client, &search_url(base_url, query)?)?;
    parse_search_response(&body)
        .ok_or_else(|| IngestError::NoData(format!("no location found for '{}'", query.trim())))
}
