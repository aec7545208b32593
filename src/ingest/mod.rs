/// Data ingestion from the public services the station browser talks to.
///
/// - `batch`: decoding of inbound reading batches into `Reading`s
/// - `gios`: GIOŚ air-quality REST API (stations, sensors, readings)
/// - `nominatim`: OpenStreetMap geocoding for the radius search
///
/// Fetch helpers are blocking and make exactly one request each; retry and
/// scheduling are left to the caller.

pub mod batch;
pub mod gios;
pub mod nominatim;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Location query too short: at least {min} characters required")]
    QueryTooShort { min: usize },
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => IngestError::Http(status.as_u16()),
            None if err.is_timeout() => IngestError::Timeout(err.to_string()),
            None => IngestError::Request(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Parse(err.to_string())
    }
}

/// Sends a GET and returns the body, mapping non-2xx statuses to
/// `IngestError::Http`.
pub(crate) fn get_text(client: &reqwest::blocking::Client, url: &str) -> Result<String, IngestError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Http(status.as_u16()));
    }

    Ok(response.text()?)
}
