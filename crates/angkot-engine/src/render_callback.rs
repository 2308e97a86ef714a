//! Render callback that publishes tracker output to the radar API.
//!
//! Every update lands in the in-memory [`RadarSnapshot`] served by the
//! REST endpoints and is broadcast as a [`RadarBroadcast`] to connected
//! `WebSocket` clients. Snapshot writes go through [`AppState::publish`],
//! so a reader in the middle of a request delays a write but never loses
//! it.
//!
//! [`RadarSnapshot`]: angkot_observer::state::RadarSnapshot

use std::sync::Arc;

use angkot_core::feed::encode_self_report;
use angkot_core::{RenderCallback, TrackerError, TrackerUpdate};
use angkot_observer::state::{AppState, RadarBroadcast};
use angkot_types::{PeerId, SelfReport};
use tracing::{debug, info, warn};

/// Callback that bridges the tracker loop to the radar API.
pub struct RadarCallback {
    state: Arc<AppState>,
}

impl RadarCallback {
    /// Create a callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl RenderCallback for RadarCallback {
    fn on_update(&mut self, update: &TrackerUpdate) {
        self.state.publish(|snap| snap.apply_update(update));

        let receivers = self.state.broadcast(RadarBroadcast::Update(update.clone()));
        debug!(
            active = update.result.active_count,
            nearby = update.result.nearby_count,
            nearest_km = update.result.nearest.as_ref().map(|e| e.distance_km),
            receivers,
            "Radar update sent"
        );
    }

    fn on_self_report(&mut self, report: &SelfReport) {
        // The browser side forwards this record to the realtime feed.
        let record = encode_self_report(report);
        info!(peer_id = %report.peer_id, record = %record, "Self report ready");

        self.state
            .publish(|snap| snap.self_report = Some(report.clone()));
        self.state.broadcast(RadarBroadcast::SelfReport(report.clone()));
    }

    fn on_stale_peers(&mut self, peers: &[PeerId]) {
        info!(count = peers.len(), "Stale drivers ready for upstream removal");

        self.state.publish(|snap| snap.stale_peers = peers.to_vec());
        self.state.broadcast(RadarBroadcast::StalePeers {
            peers: peers.to_vec(),
        });
    }

    fn on_self_retracted(&mut self, peer_id: &PeerId) {
        info!(peer_id = %peer_id, "Driver mode off, self record ready for upstream removal");

        self.state.publish(|snap| snap.self_report = None);
        self.state.broadcast(RadarBroadcast::SelfRetracted {
            peer_id: peer_id.clone(),
        });
    }

    fn on_cleared(&mut self, peers: &[PeerId]) {
        info!(count = peers.len(), "Roster wiped, drivers ready for upstream removal");

        self.state.publish(|snap| snap.stale_peers.clear());
        self.state.broadcast(RadarBroadcast::Cleared {
            peers: peers.to_vec(),
        });
    }

    fn on_error(&mut self, error: &TrackerError) {
        warn!(error = %error, "Tracker reported an error");

        let message = error.to_string();
        self.state
            .publish(|snap| snap.last_error = Some(message.clone()));
        self.state.broadcast(RadarBroadcast::Error { message });
    }
}
