//! The tracker: single owner of observer state and the peer roster.
//!
//! [`Tracker`] is where the two input streams land. Location fixes go
//! through [`Tracker::apply_fix`] / [`Tracker::apply_fix_failure`]; feed
//! events go through [`Tracker::apply_snapshot`] /
//! [`Tracker::apply_feed_failure`]. Everything the rendering side needs is
//! derived on demand from the current state via [`Tracker::evaluate`].
//!
//! Failures never clear state. A failed fix keeps the last position; a
//! failed feed keeps the last snapshot.

use angkot_types::{
    Attributes, Coordinate, FeedStatus, LocationFailure, LocationFix, LocationStatus,
    ObserverState, PeerId, PeerReport, ProximityResult, RosterEntry, SelfReport, TrackerStatus,
};
use tracing::{debug, info, warn};

use crate::config::RadarConfig;
use crate::error::TrackerError;
use crate::feed;
use crate::proximity::{ProximityEngine, ProximityParams};
use crate::store::{PositionStore, ReplaceStats};

/// Observer and roster state for one local user.
#[derive(Debug, Clone)]
pub struct Tracker {
    self_id: PeerId,
    observer: ObserverState,
    location: LocationStatus,
    feed: FeedStatus,
    store: PositionStore,
    engine: ProximityEngine,
    marker_radius_km: f64,
    driver_mode: bool,
    driver_attributes: Attributes,
}

impl Tracker {
    /// Create a tracker from loaded configuration.
    pub fn from_config(self_id: PeerId, config: &RadarConfig) -> Self {
        let mut tracker = Self::new(
            self_id,
            config.location.default_position(),
            config.tracking.proximity_params(),
        );
        tracker.marker_radius_km = config.tracking.marker_radius_km();
        tracker.driver_attributes = config.driver.attributes();
        tracker
    }

    /// Create a tracker at `default_position` with the given thresholds.
    ///
    /// The marker radius defaults to twice the detection radius.
    pub fn new(self_id: PeerId, default_position: Coordinate, params: ProximityParams) -> Self {
        Self {
            store: PositionStore::with_owner(self_id.clone()),
            self_id,
            observer: ObserverState::at(default_position),
            location: LocationStatus::Pending,
            feed: FeedStatus::Waiting,
            engine: ProximityEngine::new(params),
            marker_radius_km: params.radius_km * 2.0,
            driver_mode: false,
            driver_attributes: Attributes::new(),
        }
    }

    /// The local user's peer id.
    pub const fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Last known observer state.
    pub const fn observer(&self) -> &ObserverState {
        &self.observer
    }

    /// The peer roster.
    pub const fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Whether the local user is publishing as a driver.
    pub const fn driver_mode(&self) -> bool {
        self.driver_mode
    }

    // -----------------------------------------------------------------------
    // Location source
    // -----------------------------------------------------------------------

    /// Apply a fix from the location source.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidFix`] if the coordinates are not
    /// finite or the accuracy is negative or not finite. The previous
    /// observer state is kept in that case.
    pub fn apply_fix(&mut self, fix: &LocationFix) -> Result<(), TrackerError> {
        if !fix.coordinate().is_finite() {
            return Err(TrackerError::InvalidFix {
                reason: "coordinates are not finite".to_owned(),
            });
        }
        if !(fix.accuracy_m.is_finite() && fix.accuracy_m >= 0.0) {
            return Err(TrackerError::InvalidFix {
                reason: format!("accuracy {} is not a non-negative number", fix.accuracy_m),
            });
        }

        self.observer = ObserverState {
            position: fix.coordinate(),
            accuracy_m: Some(fix.accuracy_m),
            last_updated_ms: fix.timestamp_ms,
        };
        if self.location != LocationStatus::Ok {
            info!(lat = fix.lat, lng = fix.lng, "location fix acquired");
        }
        self.location = LocationStatus::Ok;
        debug!(
            lat = fix.lat,
            lng = fix.lng,
            accuracy_m = fix.accuracy_m,
            "observer position updated"
        );
        Ok(())
    }

    /// Record that the location source failed.
    ///
    /// The last observer state is kept and later fixes are still accepted.
    /// Returns the error to surface to the rendering side.
    pub fn apply_fix_failure(&mut self, failure: LocationFailure) -> TrackerError {
        warn!(failure = %failure, "location source failed, keeping last position");
        self.location = LocationStatus::Failed(failure);
        TrackerError::LocationUnavailable(failure)
    }

    // -----------------------------------------------------------------------
    // Snapshot feed
    // -----------------------------------------------------------------------

    /// Replace the roster with a full snapshot.
    pub fn apply_snapshot(&mut self, reports: Vec<PeerReport>) -> ReplaceStats {
        let stats = self.store.replace_all(reports);
        if self.feed != FeedStatus::Connected {
            info!("snapshot feed connected");
        }
        self.feed = FeedStatus::Connected;
        debug!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            skipped_self = stats.skipped_self,
            "snapshot applied"
        );
        stats
    }

    /// Decode a raw feed payload and apply it as a full snapshot.
    ///
    /// Malformed records are dropped; the rest still replace the roster.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedUnavailable`] if the payload is not a
    /// snapshot at all. The roster is left untouched.
    pub fn apply_feed_payload(
        &mut self,
        raw: &serde_json::Value,
    ) -> Result<ReplaceStats, TrackerError> {
        let decoded = feed::decode_snapshot(raw)?;
        let rejected = u32::try_from(decoded.rejected.len()).unwrap_or(u32::MAX);
        let mut stats = self.apply_snapshot(decoded.reports);
        stats.rejected = stats.rejected.saturating_add(rejected);
        Ok(stats)
    }

    /// Record that the feed is unreachable. The last snapshot stays.
    pub fn apply_feed_failure(&mut self, message: &str) -> TrackerError {
        warn!(
            message,
            stored_peers = self.store.len(),
            "snapshot feed unavailable, keeping last snapshot"
        );
        self.feed = FeedStatus::Disconnected;
        TrackerError::FeedUnavailable {
            message: message.to_owned(),
        }
    }

    /// Drop a peer that unregistered. Returns whether it was present.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> bool {
        let removed = self.store.remove(peer_id);
        if removed {
            debug!(peer_id = %peer_id, "peer removed");
        }
        removed
    }

    /// Wipe the whole roster. Returns the ids to delete upstream.
    pub fn clear_all(&mut self) -> Vec<PeerId> {
        let cleared = self.store.clear();
        info!(count = cleared.len(), "roster cleared");
        cleared
    }

    // -----------------------------------------------------------------------
    // Driver mode
    // -----------------------------------------------------------------------

    /// Switch driver mode. Returns whether the mode changed.
    pub fn set_driver_mode(&mut self, enabled: bool) -> bool {
        if self.driver_mode == enabled {
            return false;
        }
        self.driver_mode = enabled;
        info!(enabled, "driver mode changed");
        true
    }

    /// The report to publish upstream, present only in driver mode.
    pub fn self_report(&self, now_ms: i64) -> Option<SelfReport> {
        self.driver_mode.then(|| SelfReport {
            peer_id: self.self_id.clone(),
            position: self.observer.position,
            timestamp_ms: now_ms,
            attributes: self.driver_attributes.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    /// Evaluate the roster from the current observer position.
    pub fn evaluate(&self, now_ms: i64) -> ProximityResult {
        self.engine.evaluate(
            self.observer.position,
            &self.self_id,
            &self.store.snapshot(),
            now_ms,
        )
    }

    /// Fresh peers within the search radius, nearest first.
    pub fn nearby(&self, now_ms: i64) -> Vec<RosterEntry> {
        let result = self.evaluate(now_ms);
        let mut entries: Vec<RosterEntry> = result
            .within(self.engine.params().search_radius_km)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        entries
    }

    /// Peers whose reports are stale at `now_ms` and should be deleted
    /// upstream.
    pub fn stale_peers(&self, now_ms: i64) -> Vec<PeerId> {
        self.store.stale_ids(now_ms, self.engine.params().max_age_ms)
    }

    /// Current status for display.
    pub fn status(&self) -> TrackerStatus {
        let params = self.engine.params();
        TrackerStatus {
            self_id: self.self_id.clone(),
            observer: self.observer,
            location: self.location,
            feed: self.feed,
            driver_mode: self.driver_mode,
            stored_peers: u32::try_from(self.store.len()).unwrap_or(u32::MAX),
            radius_km: params.radius_km,
            search_radius_km: params.search_radius_km,
            marker_radius_km: self.marker_radius_km,
            max_age_ms: params.max_age_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const JAKARTA: Coordinate = Coordinate::new(-6.2088, 106.8456);

    fn tracker() -> Tracker {
        Tracker::new(PeerId::from("user_me"), JAKARTA, ProximityParams::default())
    }

    fn fix(lat: f64, lng: f64) -> LocationFix {
        LocationFix {
            lat,
            lng,
            accuracy_m: 15.0,
            timestamp_ms: NOW,
        }
    }

    fn report(id: &str, lat: f64, lng: f64, at: i64) -> PeerReport {
        PeerReport::new(PeerId::from(id), Coordinate::new(lat, lng), at)
    }

    #[test]
    fn starts_at_default_location_pending() {
        let t = tracker();
        let status = t.status();
        assert_eq!(status.location, LocationStatus::Pending);
        assert_eq!(status.feed, FeedStatus::Waiting);
        assert_eq!(status.observer.position, JAKARTA);
        assert!(!status.driver_mode);
        assert!((status.marker_radius_km - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fix_moves_observer_and_changes_distances() {
        let mut t = tracker();
        t.apply_snapshot(vec![report("bus", -6.30, 106.85, NOW)]);
        let before = t.evaluate(NOW);
        assert_eq!(before.nearby_count, 0);

        assert!(t.apply_fix(&fix(-6.2995, 106.8500)).is_ok());
        let after = t.evaluate(NOW);
        assert_eq!(after.nearby_count, 1);
        assert_eq!(t.status().location, LocationStatus::Ok);
        assert_eq!(t.observer().accuracy_m, Some(15.0));
    }

    #[test]
    fn invalid_fix_keeps_previous_state() {
        let mut t = tracker();
        assert!(t.apply_fix(&fix(-6.3, 106.9)).is_ok());
        let bad = t.apply_fix(&fix(f64::NAN, 106.9));
        assert!(matches!(bad, Err(TrackerError::InvalidFix { .. })));
        let mut negative = fix(-6.0, 106.0);
        negative.accuracy_m = -1.0;
        assert!(t.apply_fix(&negative).is_err());
        assert_eq!(t.observer().position, Coordinate::new(-6.3, 106.9));
    }

    #[test]
    fn fix_failure_keeps_position_and_accepts_later_fixes() {
        let mut t = tracker();
        assert!(t.apply_fix(&fix(-6.3, 106.9)).is_ok());

        let err = t.apply_fix_failure(LocationFailure::Timeout);
        assert_eq!(err, TrackerError::LocationUnavailable(LocationFailure::Timeout));
        assert_eq!(
            t.status().location,
            LocationStatus::Failed(LocationFailure::Timeout)
        );
        assert_eq!(t.observer().position, Coordinate::new(-6.3, 106.9));

        assert!(t.apply_fix(&fix(-6.4, 106.9)).is_ok());
        assert_eq!(t.status().location, LocationStatus::Ok);
    }

    #[test]
    fn feed_failure_keeps_last_snapshot() {
        let mut t = tracker();
        t.apply_snapshot(vec![report("bus", -6.2088, 106.8456, NOW)]);
        let err = t.apply_feed_failure("network down");
        assert!(matches!(err, TrackerError::FeedUnavailable { .. }));
        assert_eq!(t.status().feed, FeedStatus::Disconnected);
        assert_eq!(t.evaluate(NOW).active_count, 1);

        t.apply_snapshot(Vec::new());
        assert_eq!(t.status().feed, FeedStatus::Connected);
        assert_eq!(t.evaluate(NOW).active_count, 0);
    }

    #[test]
    fn snapshot_with_own_id_only_is_empty() {
        let mut t = tracker();
        let stats = t.apply_snapshot(vec![report("user_me", -6.2088, 106.8456, NOW)]);
        assert_eq!(stats.skipped_self, 1);
        assert_eq!(t.evaluate(NOW).active_count, 0);
    }

    #[test]
    fn feed_payload_is_decoded_and_applied() {
        let mut t = tracker();
        let raw = json!({
            "bus1": {"lat": -6.2088, "lng": 106.8456, "timestamp": NOW, "plateNumber": "B 1 AC"},
            "broken": {"lat": "x"}
        });
        let stats = t.apply_feed_payload(&raw);
        assert_eq!(
            stats.ok(),
            Some(ReplaceStats {
                accepted: 1,
                rejected: 1,
                skipped_self: 0
            })
        );
        let result = t.evaluate(NOW);
        assert_eq!(
            result.roster.first().and_then(|e| e.attribute_str("plateNumber")),
            Some("B 1 AC")
        );
    }

    #[test]
    fn feed_payload_of_wrong_shape_leaves_roster() {
        let mut t = tracker();
        t.apply_snapshot(vec![report("bus", -6.2088, 106.8456, NOW)]);
        assert!(t.apply_feed_payload(&json!("nope")).is_err());
        assert_eq!(t.store().len(), 1);
    }

    #[test]
    fn self_report_only_in_driver_mode() {
        let mut t = tracker();
        assert!(t.self_report(NOW).is_none());

        assert!(t.set_driver_mode(true));
        assert!(!t.set_driver_mode(true));
        let report = t.self_report(NOW);
        assert_eq!(report.as_ref().map(|r| r.timestamp_ms), Some(NOW));
        assert_eq!(report.map(|r| r.position), Some(JAKARTA));

        assert!(t.set_driver_mode(false));
        assert!(t.self_report(NOW).is_none());
    }

    #[test]
    fn from_config_carries_driver_attributes() {
        let mut config = RadarConfig::default();
        config.driver.plate_number = Some("B 77 AC".to_owned());
        let mut t = Tracker::from_config(PeerId::from("user_me"), &config);
        t.set_driver_mode(true);
        let attributes = t.self_report(NOW).map(|r| r.attributes).unwrap_or_default();
        assert_eq!(attributes.get("plateNumber"), Some(&json!("B 77 AC")));
        assert_eq!(attributes.get("vehicleType"), Some(&json!("angkot")));
    }

    #[test]
    fn nearby_is_limited_to_search_radius_nearest_first() {
        let mut t = tracker();
        t.apply_snapshot(vec![
            report("far", -6.2188, 106.8356, NOW),
            report("mid", -6.2128, 106.8456, NOW),
            report("here", -6.2088, 106.8456, NOW),
        ]);
        let ids: Vec<String> = t
            .nearby(NOW)
            .into_iter()
            .map(|e| e.peer_id.to_string())
            .collect();
        assert_eq!(ids, vec!["here".to_owned(), "mid".to_owned()]);
        assert_eq!(t.evaluate(NOW).nearby_count, 3);
    }

    #[test]
    fn stale_peers_and_removal() {
        let mut t = tracker();
        t.apply_snapshot(vec![
            report("fresh", -6.2088, 106.8456, NOW),
            report("old", -6.2088, 106.8456, NOW - 600_000),
        ]);
        assert_eq!(t.stale_peers(NOW), vec![PeerId::from("old")]);
        assert_eq!(t.evaluate(NOW).active_count, 1);

        assert!(t.remove_peer(&PeerId::from("fresh")));
        assert!(!t.remove_peer(&PeerId::from("fresh")));
        assert_eq!(t.evaluate(NOW).active_count, 0);
        assert_eq!(t.status().stored_peers, 1);
    }

    #[test]
    fn clear_all_empties_roster_and_keeps_observer() {
        let mut t = tracker();
        assert!(t.apply_fix(&fix(-6.3, 106.9)).is_ok());
        t.apply_snapshot(vec![
            report("b", -6.3, 106.9, NOW),
            report("a", -6.3, 106.9, NOW - 600_000),
        ]);

        assert_eq!(t.clear_all(), vec![PeerId::from("a"), PeerId::from("b")]);
        let result = t.evaluate(NOW);
        assert_eq!(result.active_count, 0);
        assert_eq!(result.nearby_count, 0);
        assert!(t.stale_peers(NOW).is_empty());
        assert_eq!(t.observer().position, Coordinate::new(-6.3, 106.9));
    }
}
