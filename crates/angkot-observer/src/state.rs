//! Shared application state for the radar API server.
//!
//! [`AppState`] holds the broadcast channel for live radar messages, the
//! last published [`RadarSnapshot`] that the REST endpoints serve, and the
//! producer handle the ingest endpoints forward events through.
//!
//! The snapshot sits in a `watch` channel. The tracker loop replaces it in
//! place with [`AppState::publish`], which always lands; readers take a
//! copy with [`AppState::view`] and never hold it across an `.await`.

use std::sync::Arc;

use angkot_core::{TrackerError, TrackerHandle, TrackerUpdate};
use angkot_types::{PeerId, ProximityResult, SelfReport, TrackerStatus};
use tokio::sync::{broadcast, watch};

/// Capacity of the broadcast channel for radar messages.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BROADCAST_CAPACITY: usize = 256;

/// JSON message pushed over the `WebSocket`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RadarBroadcast {
    /// A fresh evaluation after a state change.
    Update(TrackerUpdate),
    /// The self report published in driver mode.
    SelfReport(SelfReport),
    /// Peers found stale by the cleanup timer.
    StalePeers {
        /// Ids to delete upstream.
        peers: Vec<PeerId>,
    },
    /// Driver mode was switched off; the local record should be deleted
    /// upstream.
    SelfRetracted {
        /// The local user's id.
        peer_id: PeerId,
    },
    /// Every driver was wiped from the roster.
    Cleared {
        /// Ids to delete upstream.
        peers: Vec<PeerId>,
    },
    /// A rejected event or failed source.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Last published tracker output, served by the REST endpoints.
///
/// Updated by the tracker loop after every state change so readers never
/// touch the tracker itself.
#[derive(Debug, Clone, Default)]
pub struct RadarSnapshot {
    /// Latest proximity result.
    pub result: ProximityResult,
    /// Latest tracker status, absent until the loop publishes.
    pub status: Option<TrackerStatus>,
    /// Latest self report, absent outside driver mode.
    pub self_report: Option<SelfReport>,
    /// Stale ids from the last cleanup tick.
    pub stale_peers: Vec<PeerId>,
    /// Latest error surfaced by the tracker.
    pub last_error: Option<String>,
    /// When `result` was evaluated (0 before the first update).
    pub updated_at_ms: i64,
}

impl RadarSnapshot {
    /// Replace the result and status with a fresh update.
    ///
    /// The self report is dropped once driver mode is switched off.
    pub fn apply_update(&mut self, update: &TrackerUpdate) {
        self.result = update.result.clone();
        if !update.status.driver_mode {
            self.self_report = None;
        }
        self.status = Some(update.status.clone());
        self.updated_at_ms = update.evaluated_at_ms;
    }

    /// Search radius from the last status, or the default before one.
    pub fn search_radius_km(&self) -> f64 {
        self.status.as_ref().map_or(
            angkot_core::proximity::DEFAULT_SEARCH_RADIUS_KM,
            |s| s.search_radius_km,
        )
    }

    /// Map marker radius from the last status, or twice the default
    /// detection radius before one.
    pub fn marker_radius_km(&self) -> f64 {
        self.status.as_ref().map_or(
            angkot_core::proximity::DEFAULT_RADIUS_KM * 2.0,
            |s| s.marker_radius_km,
        )
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for radar messages.
    pub tx: broadcast::Sender<RadarBroadcast>,
    /// The last published tracker output.
    pub snapshot: Arc<watch::Sender<RadarSnapshot>>,
    /// Producer handle into the tracker loop (present when one is running).
    pub tracker: Option<TrackerHandle>,
}

impl AppState {
    /// Create a read-only application state with an empty snapshot.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (snapshot, _) = watch::channel(RadarSnapshot::default());
        Self {
            tx,
            snapshot: Arc::new(snapshot),
            tracker: None,
        }
    }

    /// Create an application state that forwards ingest to a tracker.
    pub fn with_tracker(tracker: TrackerHandle) -> Self {
        Self {
            tracker: Some(tracker),
            ..Self::new()
        }
    }

    /// The attached tracker handle.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if no tracker is attached.
    pub fn tracker(&self) -> Result<&TrackerHandle, TrackerError> {
        self.tracker.as_ref().ok_or(TrackerError::ChannelClosed)
    }

    /// Copy of the last published snapshot.
    pub fn view(&self) -> RadarSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Modify the published snapshot in place.
    ///
    /// Never fails and never drops the change; concurrent readers only
    /// delay it for as long as their copy takes.
    pub fn publish(&self, modify: impl FnOnce(&mut RadarSnapshot)) {
        self.snapshot.send_modify(modify);
    }

    /// Receiver notified on every [`AppState::publish`].
    pub fn watch(&self) -> watch::Receiver<RadarSnapshot> {
        self.snapshot.subscribe()
    }

    /// Subscribe to the radar broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<RadarBroadcast> {
        self.tx.subscribe()
    }

    /// Publish a message to all connected clients.
    ///
    /// Returns the number of receivers that received the message.
    /// Returns 0 if no clients are connected (this is not an error).
    pub fn broadcast(&self, message: RadarBroadcast) -> usize {
        // send returns Err only when there are zero receivers.
        self.tx.send(message).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use angkot_types::{Coordinate, FeedStatus, LocationStatus, ObserverState};

    use super::*;

    fn status(driver_mode: bool) -> TrackerStatus {
        TrackerStatus {
            self_id: PeerId::from("user_me"),
            observer: ObserverState::at(Coordinate::new(-6.2088, 106.8456)),
            location: LocationStatus::Pending,
            feed: FeedStatus::Waiting,
            driver_mode,
            stored_peers: 0,
            radius_km: 2.0,
            search_radius_km: 0.5,
            marker_radius_km: 4.0,
            max_age_ms: 300_000,
        }
    }

    #[test]
    fn update_clears_self_report_outside_driver_mode() {
        let mut snapshot = RadarSnapshot {
            self_report: Some(SelfReport {
                peer_id: PeerId::from("user_me"),
                position: Coordinate::new(0.0, 0.0),
                timestamp_ms: 1,
                attributes: angkot_types::Attributes::new(),
            }),
            ..RadarSnapshot::default()
        };
        assert!((snapshot.search_radius_km() - 1.0).abs() < f64::EPSILON);

        snapshot.apply_update(&TrackerUpdate {
            result: ProximityResult::default(),
            status: status(true),
            evaluated_at_ms: 10,
        });
        assert!(snapshot.self_report.is_some());
        assert!((snapshot.search_radius_km() - 0.5).abs() < f64::EPSILON);

        snapshot.apply_update(&TrackerUpdate {
            result: ProximityResult::default(),
            status: status(false),
            evaluated_at_ms: 20,
        });
        assert!(snapshot.self_report.is_none());
        assert_eq!(snapshot.updated_at_ms, 20);
    }

    #[test]
    fn broadcast_without_subscribers_is_zero() {
        let state = AppState::new();
        assert!(state.tracker().is_err());
        assert_eq!(
            state.broadcast(RadarBroadcast::Error {
                message: "x".to_owned()
            }),
            0
        );
        let mut rx = state.subscribe();
        assert_eq!(state.broadcast(RadarBroadcast::StalePeers { peers: Vec::new() }), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn publish_reaches_view_and_watchers() {
        let state = AppState::new();
        let mut watcher = state.watch();
        assert_eq!(state.view().updated_at_ms, 0);

        state.publish(|snap| snap.stale_peers = vec![PeerId::from("user_old")]);

        assert_eq!(state.view().stale_peers, vec![PeerId::from("user_old")]);
        assert_eq!(watcher.has_changed().ok(), Some(true));
        assert_eq!(
            watcher.borrow_and_update().stale_peers,
            vec![PeerId::from("user_old")]
        );
        assert!((state.view().marker_radius_km() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn broadcast_is_tagged_by_type() {
        let json = serde_json::to_value(RadarBroadcast::StalePeers {
            peers: vec![PeerId::from("user_a")],
        })
        .ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"type": "stale_peers", "peers": ["user_a"]}))
        );

        let json = serde_json::to_value(RadarBroadcast::SelfRetracted {
            peer_id: PeerId::from("user_me"),
        })
        .ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"type": "self_retracted", "peer_id": "user_me"}))
        );
    }
}
