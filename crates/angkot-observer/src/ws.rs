//! `WebSocket` handler for the live radar stream.
//!
//! Clients connect to `GET /ws/radar` and receive a JSON-encoded
//! [`RadarBroadcast`] for every update, self report, stale-peer list, and
//! surfaced error. On connect the client first gets the last published
//! update, if there is one, so it can render without waiting.
//!
//! If a client falls behind, lagged messages are silently skipped and
//! the client resumes from the most recent message.
//!
//! [`RadarBroadcast`]: crate::state::RadarBroadcast

use std::sync::Arc;

use angkot_core::TrackerUpdate;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tracing::{debug, warn};

use crate::state::{AppState, RadarBroadcast};

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming radar messages.
///
/// # Route
///
/// `GET /ws/radar`
pub async fn ws_radar(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn send_json(socket: &mut WebSocket, message: &RadarBroadcast) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize radar broadcast: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handle the `WebSocket` lifecycle: send the current view, subscribe to
/// the broadcast channel, and forward each message as a text frame.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    // Subscribe before reading the snapshot so nothing published in
    // between is missed.
    let mut rx = state.subscribe();

    let initial = {
        let snapshot = state.view();
        snapshot.status.map(|status| {
            RadarBroadcast::Update(TrackerUpdate {
                result: snapshot.result,
                status,
                evaluated_at_ms: snapshot.updated_at_ms,
            })
        })
    };
    if let Some(message) = initial
        && !send_json(&mut socket, &message).await
    {
        debug!("WebSocket client disconnected (initial send failed)");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        if !send_json(&mut socket, &message).await {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    // Clients only listen; anything else they send is ignored.
                    _ => {}
                }
            }
        }
    }
}
