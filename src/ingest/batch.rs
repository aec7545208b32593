/// Decoding of inbound reading batches.
///
/// A batch is either a bare array of `{ "date": ..., "value": ... }` objects
/// or the GIOŚ envelope `{ "key": "PM10", "values": [ ... ] }`. Decoding is
/// per element and lenient:
///
/// | element                                 | result            |
/// |-----------------------------------------|-------------------|
/// | `date` missing or not `DATE_FORMAT`     | dropped           |
/// | `value` key absent                      | dropped           |
/// | `value: null`                           | missing reading   |
/// | `value: <number>`                       | reading           |
/// | `value` of any other type               | dropped           |
///
/// Only a document that is not JSON, or JSON of neither shape, is an error.

use serde_json::Value;

use super::IngestError;
use crate::logging::{self, DataSource};
use crate::model::{parse_timestamp, Reading};

/// Decodes a batch from raw JSON text.
pub fn parse_readings(json: &str) -> Result<Vec<Reading>, IngestError> {
    let document: Value = serde_json::from_str(json)?;
    decode_readings(&document)
}

/// Decodes a batch from an already-parsed JSON document.
pub fn decode_readings(document: &Value) -> Result<Vec<Reading>, IngestError> {
    let elements = match document {
        Value::Array(items) => items,
        Value::Object(envelope) => match envelope.get("values") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(IngestError::Parse(
                    "batch object has no \"values\" array".to_string(),
                ));
            }
        },
        _ => {
            return Err(IngestError::Parse(
                "batch is neither an array nor an object".to_string(),
            ));
        }
    };

    Ok(elements.iter().filter_map(decode_element).collect())
}

fn decode_element(element: &Value) -> Option<Reading> {
    let timestamp = element.get("date")?.as_str().and_then(parse_timestamp)?;
    match element.get("value")? {
        Value::Null => Some(Reading::missing(timestamp)),
        Value::Number(n) => n.as_f64().map(|v| Reading::new(timestamp, v)),
        _ => None,
    }
}

/// Like `parse_readings`, but a malformed document degrades to an empty
/// batch with a logged warning.
pub fn decode_or_empty(json: &str, subject: &str) -> Vec<Reading> {
    match parse_readings(json) {
        Ok(readings) => readings,
        Err(e) => {
            logging::warn(
                DataSource::Gios,
                Some(subject),
                &format!("Discarding malformed reading batch: {}", e),
            );
            Vec::new()
        }
    }
}
