//! Read-only REST endpoint handlers for the radar API.
//!
//! All handlers read from the last published [`RadarSnapshot`] via the
//! shared [`AppState`]. None of them touch the tracker.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/proximity` | Latest proximity result |
//! | `GET` | `/api/drivers` | Fresh drivers (`order`, `within_km`, `limit`) |
//! | `GET` | `/api/drivers/{id}` | Single driver |
//! | `GET` | `/api/nearby` | Drivers inside the search radius |
//! | `GET` | `/api/markers` | Drivers inside the map marker radius |
//! | `GET` | `/api/status` | Tracker status |
//! | `GET` | `/api/self` | Latest self report |
//! | `GET` | `/api/stale` | Stale ids from the last cleanup |
//!
//! [`RadarSnapshot`]: crate::state::RadarSnapshot

use std::sync::Arc;

use angkot_core::format::{age_bucket, format_accuracy, format_coordinate, format_distance_km};
use angkot_types::{PeerId, RosterEntry};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use chrono::DateTime;

use crate::error::ObserverError;
use crate::state::AppState;

/// Upper bound on `limit` for roster listings.
const MAX_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/drivers` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct DriversQuery {
    /// `nearest` sorts by distance; anything else keeps peer-id order.
    pub order: Option<String>,
    /// Only include drivers at most this far away.
    pub within_km: Option<f64>,
    /// Maximum number of drivers to return (max 1000).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing tracker status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.view();
    let active = snapshot.result.active_count;
    let nearby = snapshot.result.nearby_count;
    let nearest = snapshot.result.nearest.as_ref().map_or_else(
        || String::from("none"),
        |e| format_distance_km(e.distance_km),
    );
    let (position, accuracy, driver_mode) = snapshot.status.as_ref().map_or_else(
        || (String::from("-"), String::from("-"), false),
        |s| {
            (
                format_coordinate(s.observer.position),
                s.observer
                    .accuracy_m
                    .map_or_else(|| String::from("default location"), format_accuracy),
                s.driver_mode,
            )
        },
    );
    let updated = DateTime::from_timestamp_millis(snapshot.updated_at_ms)
        .filter(|_| snapshot.updated_at_ms > 0)
        .map_or_else(|| String::from("never"), |t| t.format("%H:%M:%S").to_string());
    let mode = if driver_mode { "DRIVER" } else { "PASSENGER" };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Angkot Radar</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Angkot Radar</h1>
    <p class="subtitle">Nearby angkot tracker</p>

    <p>Mode: <span class="status">{mode}</span> &middot; Updated: {updated}</p>
    <p>Position: {position} ({accuracy})</p>

    <div>
        <div class="metric">
            <div class="label">Active</div>
            <div class="value">{active}</div>
        </div>
        <div class="metric">
            <div class="label">Nearby</div>
            <div class="value">{nearby}</div>
        </div>
        <div class="metric">
            <div class="label">Nearest</div>
            <div class="value">{nearest}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/proximity">/api/proximity</a> -- Latest proximity result</li>
        <li>GET <a href="/api/drivers?order=nearest">/api/drivers</a> -- Fresh drivers (?order=nearest&amp;within_km=N&amp;limit=N)</li>
        <li>GET <a href="/api/nearby">/api/nearby</a> -- Drivers inside the search radius</li>
        <li>GET <a href="/api/markers">/api/markers</a> -- Drivers inside the map marker radius</li>
        <li>GET <a href="/api/status">/api/status</a> -- Tracker status</li>
        <li>GET <a href="/api/self">/api/self</a> -- Latest self report</li>
        <li>GET <a href="/api/stale">/api/stale</a> -- Stale drivers from the last cleanup</li>
        <li>POST /api/location, POST /api/location/error -- Location source</li>
        <li>PUT /api/feed, POST /api/feed/error -- Snapshot feed</li>
        <li>DELETE /api/drivers/{{id}}, DELETE /api/drivers, POST /api/driver-mode -- Control</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws/radar</code> -- Live radar stream</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/proximity
// ---------------------------------------------------------------------------

/// Return the latest proximity result as published by the tracker.
pub async fn get_proximity(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    Ok(Json(serde_json::json!({
        "active_count": snapshot.result.active_count,
        "nearby_count": snapshot.result.nearby_count,
        "nearest": snapshot.result.nearest.as_ref().map(driver_view),
        "evaluated_at_ms": snapshot.updated_at_ms,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/drivers
// ---------------------------------------------------------------------------

/// List fresh drivers.
///
/// # Query Parameters
///
/// - `order`: `nearest` to sort by ascending distance (default: peer id).
/// - `within_km`: only drivers at most this far away.
/// - `limit`: maximum number of drivers (default and max 1000).
pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DriversQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    if let Some(km) = params.within_km
        && !(km.is_finite() && km >= 0.0)
    {
        return Err(ObserverError::InvalidQuery(format!(
            "within_km must be a non-negative number, got {km}"
        )));
    }
    let limit = params.limit.unwrap_or(MAX_LIMIT).min(MAX_LIMIT);

    let snapshot = state.view();
    let entries: Vec<&RosterEntry> = match params.order.as_deref() {
        Some("nearest") => snapshot.result.nearest_first(),
        Some("id") | None => snapshot.result.roster.iter().collect(),
        Some(other) => {
            return Err(ObserverError::InvalidQuery(format!(
                "unknown order '{other}', expected 'nearest' or 'id'"
            )));
        }
    };

    let drivers: Vec<serde_json::Value> = entries
        .into_iter()
        .filter(|e| params.within_km.is_none_or(|km| e.distance_km <= km))
        .take(limit)
        .map(driver_view)
        .collect();

    Ok(Json(serde_json::json!({
        "count": drivers.len(),
        "drivers": drivers,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/drivers/{id}
// ---------------------------------------------------------------------------

/// Return one fresh driver by peer id.
pub async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let peer_id = PeerId::from(id.as_str());
    let snapshot = state.view();
    let entry = snapshot
        .result
        .entry(&peer_id)
        .ok_or_else(|| ObserverError::NotFound(format!("driver {peer_id}")))?;
    Ok(Json(driver_view(entry)))
}

// ---------------------------------------------------------------------------
// GET /api/nearby
// ---------------------------------------------------------------------------

/// Drivers inside the search radius, nearest first.
pub async fn get_nearby(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    let radius_km = snapshot.search_radius_km();
    let mut entries: Vec<&RosterEntry> = snapshot.result.within(radius_km).collect();
    entries.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    let drivers: Vec<serde_json::Value> = entries.into_iter().map(driver_view).collect();

    Ok(Json(serde_json::json!({
        "radius_km": radius_km,
        "count": drivers.len(),
        "drivers": drivers,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/markers
// ---------------------------------------------------------------------------

/// Drivers close enough to get a map marker, in peer-id order.
///
/// The marker radius is wider than the detection radius so drivers show
/// up on the map before they count as nearby.
pub async fn get_markers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    let radius_km = snapshot.marker_radius_km();
    let markers: Vec<serde_json::Value> = snapshot
        .result
        .within(radius_km)
        .map(|entry| {
            serde_json::json!({
                "peer_id": entry.peer_id,
                "position": entry.position,
                "title": entry.attribute_str("plateNumber").unwrap_or("Kendaraan"),
                "route": entry.attribute_str("route"),
                "distance": format_distance_km(entry.distance_km),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "radius_km": radius_km,
        "count": markers.len(),
        "markers": markers,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the latest tracker status.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    let status = snapshot
        .status
        .as_ref()
        .ok_or_else(|| ObserverError::NotFound("tracker has not published yet".to_owned()))?;
    Ok(Json(serde_json::json!({
        "status": status,
        "position": format_coordinate(status.observer.position),
        "accuracy": status.observer.accuracy_m.map(format_accuracy),
        "last_error": snapshot.last_error,
        "tracker_attached": state.tracker.is_some(),
    })))
}

// ---------------------------------------------------------------------------
// GET /api/self
// ---------------------------------------------------------------------------

/// Return the latest self report, in the feed's record shape.
pub async fn get_self(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    let report = snapshot
        .self_report
        .as_ref()
        .ok_or_else(|| ObserverError::NotFound("driver mode is off".to_owned()))?;
    Ok(Json(serde_json::json!({
        "peer_id": report.peer_id,
        "record": angkot_core::feed::encode_self_report(report),
    })))
}

// ---------------------------------------------------------------------------
// GET /api/stale
// ---------------------------------------------------------------------------

/// Return the stale ids found by the last cleanup tick.
pub async fn get_stale(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let snapshot = state.view();
    Ok(Json(serde_json::json!({
        "count": snapshot.stale_peers.len(),
        "peers": snapshot.stale_peers,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// JSON view of a roster entry with display labels.
fn driver_view(entry: &RosterEntry) -> serde_json::Value {
    serde_json::json!({
        "peer_id": entry.peer_id,
        "position": entry.position,
        "distance_km": entry.distance_km,
        "distance": format_distance_km(entry.distance_km),
        "age_ms": entry.age_ms,
        "age": age_bucket(entry.age_ms).to_string(),
        "attributes": entry.attributes,
    })
}
