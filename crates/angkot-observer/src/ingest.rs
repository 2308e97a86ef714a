//! Ingest REST handlers for the two producer streams and driver control.
//!
//! These endpoints never touch tracker state directly. Each one queues a
//! [`TrackerEvent`] on the attached [`TrackerHandle`] and answers
//! `202 Accepted`; the result shows up in the read endpoints and on the
//! `WebSocket` once the loop has processed it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/location` | Push a location fix |
//! | `POST` | `/api/location/error` | Report a location source failure |
//! | `PUT` | `/api/feed` | Push a raw feed snapshot |
//! | `POST` | `/api/feed/error` | Report the feed as unreachable |
//! | `DELETE` | `/api/drivers/{id}` | A driver unregistered |
//! | `DELETE` | `/api/drivers` | Wipe every driver |
//! | `POST` | `/api/driver-mode` | Switch driver mode |
//!
//! [`TrackerEvent`]: angkot_core::TrackerEvent
//! [`TrackerHandle`]: angkot_core::TrackerHandle

use std::sync::Arc;

use angkot_types::{LocationFailure, LocationFix, PeerId};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::debug;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/location/error`.
#[derive(Debug, serde::Deserialize)]
pub struct LocationErrorRequest {
    /// Failure category reported by the location source.
    pub failure: LocationFailure,
}

/// Request body for `POST /api/feed/error`.
#[derive(Debug, serde::Deserialize)]
pub struct FeedErrorRequest {
    /// Description of the feed failure.
    pub message: String,
}

/// Request body for `POST /api/driver-mode`.
#[derive(Debug, serde::Deserialize)]
pub struct DriverModeRequest {
    /// Whether driver mode should be on.
    pub enabled: bool,
}

/// Response body for accepted ingest requests.
#[derive(Debug, serde::Serialize)]
struct IngestResponse {
    /// Always `true`; failures use the error body.
    queued: bool,
    /// Human-readable message.
    message: String,
}

fn accepted(message: impl Into<String>) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            queued: true,
            message: message.into(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Location source
// ---------------------------------------------------------------------------

/// Queue a location fix.
pub async fn post_location(
    State(state): State<Arc<AppState>>,
    Json(fix): Json<LocationFix>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.push_fix(fix).await?;
    debug!(lat = fix.lat, lng = fix.lng, "Location fix queued");
    Ok(accepted("location fix queued"))
}

/// Queue a location source failure.
pub async fn post_location_error(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LocationErrorRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.push_fix_failure(body.failure).await?;
    Ok(accepted(format!("location failure queued: {}", body.failure)))
}

// ---------------------------------------------------------------------------
// Snapshot feed
// ---------------------------------------------------------------------------

/// Queue a raw feed snapshot. Decoding happens in the tracker loop.
pub async fn put_feed(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.push_snapshot(raw).await?;
    Ok(accepted("snapshot queued"))
}

/// Queue a feed failure.
pub async fn post_feed_error(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FeedErrorRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.push_feed_failure(body.message).await?;
    Ok(accepted("feed failure queued"))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// Queue the removal of a driver that unregistered.
pub async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let peer_id = PeerId::from(id.as_str());
    if peer_id.is_empty() {
        return Err(ObserverError::InvalidQuery("driver id is empty".to_owned()));
    }
    state.tracker()?.remove_peer(peer_id.clone()).await?;
    Ok(accepted(format!("removal of {peer_id} queued")))
}

/// Queue a wipe of the whole roster.
pub async fn clear_drivers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.clear_all().await?;
    Ok(accepted("roster wipe queued"))
}

/// Queue a driver mode switch.
pub async fn post_driver_mode(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DriverModeRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state.tracker()?.set_driver_mode(body.enabled).await?;
    let mode = if body.enabled { "on" } else { "off" };
    Ok(accepted(format!("driver mode {mode} queued")))
}
