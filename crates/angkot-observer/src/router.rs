//! Axum router construction for the radar API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS enabled so the browser map page can call it from any origin.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::ingest;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the radar server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /ws/radar` -- `WebSocket` radar stream
/// - `GET /api/proximity`, `/api/drivers`, `/api/drivers/{id}`,
///   `/api/nearby`, `/api/markers`, `/api/status`, `/api/self`,
///   `/api/stale` -- reads
/// - `POST /api/location`, `/api/location/error`, `PUT /api/feed`,
///   `POST /api/feed/error` -- producer ingest
/// - `DELETE /api/drivers/{id}`, `DELETE /api/drivers`,
///   `POST /api/driver-mode` -- control
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        // WebSocket
        .route("/ws/radar", get(ws::ws_radar))
        // Read API
        .route("/api/proximity", get(handlers::get_proximity))
        .route(
            "/api/drivers",
            get(handlers::list_drivers).delete(ingest::clear_drivers),
        )
        .route(
            "/api/drivers/{id}",
            get(handlers::get_driver).delete(ingest::delete_driver),
        )
        .route("/api/nearby", get(handlers::get_nearby))
        .route("/api/markers", get(handlers::get_markers))
        .route("/api/status", get(handlers::get_status))
        .route("/api/self", get(handlers::get_self))
        .route("/api/stale", get(handlers::get_stale))
        // Ingest API
        .route("/api/location", post(ingest::post_location))
        .route("/api/location/error", post(ingest::post_location_error))
        .route("/api/feed", put(ingest::put_feed))
        .route("/api/feed/error", post(ingest::post_feed_error))
        .route("/api/driver-mode", post(ingest::post_driver_mode))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
