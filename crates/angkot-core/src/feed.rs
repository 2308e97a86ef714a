//! Translation between the realtime feed's driver records and
//! [`PeerReport`]s.
//!
//! The feed delivers one JSON object per tick, keyed by peer id:
//!
//! ```json
//! {
//!   "user_k2j4h5g6f": {
//!     "lat": -6.2088, "lng": 106.8456, "timestamp": 1700000000000,
//!     "plateNumber": "B 1234 AC", "route": "Kampung Melayu - Tanah Abang"
//!   }
//! }
//! ```
//!
//! `lat`, `lng`, and `timestamp` are required; every other field is kept
//! as a display attribute. An empty database is delivered as `null`.

use angkot_types::{Attributes, Coordinate, PeerId, PeerReport, SelfReport};
use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::TrackerError;

const LAT: &str = "lat";
const LNG: &str = "lng";
const TIMESTAMP: &str = "timestamp";

/// Result of decoding one feed snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSnapshot {
    /// Well-formed reports, in key order.
    pub reports: Vec<PeerReport>,
    /// One error per rejected record.
    pub rejected: Vec<TrackerError>,
}

/// Decode a full feed snapshot.
///
/// Individual malformed records are logged, collected in
/// [`DecodedSnapshot::rejected`], and skipped.
///
/// # Errors
///
/// Returns [`TrackerError::FeedUnavailable`] if the payload is neither an
/// object nor `null`.
pub fn decode_snapshot(raw: &Value) -> Result<DecodedSnapshot, TrackerError> {
    let records = match raw {
        Value::Null => return Ok(DecodedSnapshot::default()),
        Value::Object(records) => records,
        other => {
            return Err(TrackerError::FeedUnavailable {
                message: format!("snapshot must be an object, got {}", type_name(other)),
            });
        }
    };

    let mut decoded = DecodedSnapshot::default();
    for (key, record) in records {
        match decode_record(key, record) {
            Ok(report) => decoded.reports.push(report),
            Err(e) => {
                warn!(peer_id = %key, error = %e, "rejecting feed record");
                decoded.rejected.push(e);
            }
        }
    }
    Ok(decoded)
}

/// Decode a single driver record stored under `key`.
///
/// # Errors
///
/// Returns [`TrackerError::InvalidReport`] if the record is not an object
/// or lacks a numeric `lat`, `lng`, or `timestamp`.
pub fn decode_record(key: &str, record: &Value) -> Result<PeerReport, TrackerError> {
    let peer_id = PeerId::from(key);
    let Value::Object(fields) = record else {
        return Err(TrackerError::invalid_report(&peer_id, "record is not an object"));
    };

    let lat = number(fields, LAT).ok_or_else(|| missing(&peer_id, LAT))?;
    let lng = number(fields, LNG).ok_or_else(|| missing(&peer_id, LNG))?;
    let reported_at_ms = fields
        .get(TIMESTAMP)
        .and_then(millis)
        .ok_or_else(|| missing(&peer_id, TIMESTAMP))?;

    let attributes: Attributes = fields
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), LAT | LNG | TIMESTAMP))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Ok(PeerReport {
        peer_id,
        position: Coordinate::new(lat, lng),
        reported_at_ms,
        attributes,
    })
}

/// Encode the local self report in the feed's driver record shape.
///
/// Attributes are written first so the position fields always win.
pub fn encode_self_report(report: &SelfReport) -> Value {
    let mut fields: Map<String, Value> = report
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    fields.insert("userId".to_owned(), Value::from(report.peer_id.as_str()));
    fields.insert(LAT.to_owned(), Value::from(report.position.lat));
    fields.insert(LNG.to_owned(), Value::from(report.position.lng));
    fields.insert(TIMESTAMP.to_owned(), Value::from(report.timestamp_ms));
    fields.insert("isActive".to_owned(), Value::Bool(true));
    if let Some(time) = DateTime::from_timestamp_millis(report.timestamp_ms) {
        fields.insert(
            "lastUpdate".to_owned(),
            Value::from(time.format("%H:%M:%S").to_string()),
        );
    }

    Value::Object(fields)
}

fn number(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    fields.get(name).and_then(Value::as_f64)
}

fn millis(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms);
    }
    // Some clients write fractional milliseconds.
    // Bounded well inside the i64 range before the cast.
    #[allow(clippy::cast_possible_truncation)]
    let ms = value
        .as_f64()
        .filter(|ms| ms.is_finite() && ms.abs() < 9.0e15)
        .map(|ms| ms.trunc() as i64);
    ms
}

fn missing(peer_id: &PeerId, field: &str) -> TrackerError {
    TrackerError::invalid_report(peer_id, format!("missing or non-numeric '{field}'"))
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
