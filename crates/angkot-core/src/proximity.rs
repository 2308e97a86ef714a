//! Proximity evaluation over a snapshot of peer reports.
//!
//! [`ProximityEngine::evaluate`] is a pure function of its inputs: the
//! observer position, the observer's own id, a store snapshot, and the
//! current time. Staleness is decided on every call, so nothing derived
//! here can drift from the underlying reports.

use std::collections::BTreeMap;

use angkot_types::{Coordinate, PeerId, PeerReport, ProximityResult, RosterEntry};

use crate::geo::haversine_km;

/// Default detection radius in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 2.0;

/// Default maximum report age (5 minutes).
pub const DEFAULT_MAX_AGE_MS: i64 = 300_000;

/// Default radius for the nearest-vehicle search in kilometers.
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 1.0;

/// Tunable thresholds for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityParams {
    /// Peers at or inside this distance count as nearby.
    pub radius_km: f64,
    /// Reports strictly older than this are stale.
    pub max_age_ms: i64,
    /// The nearest peer is only selected inside this distance.
    pub search_radius_km: f64,
}

impl Default for ProximityParams {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            max_age_ms: DEFAULT_MAX_AGE_MS,
            search_radius_km: DEFAULT_SEARCH_RADIUS_KM,
        }
    }
}

/// Computes distances, freshness, and nearest-match selection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProximityEngine {
    params: ProximityParams,
}

impl ProximityEngine {
    /// Create an engine with the given thresholds.
    pub const fn new(params: ProximityParams) -> Self {
        Self { params }
    }

    /// The thresholds this engine applies.
    pub const fn params(&self) -> &ProximityParams {
        &self.params
    }

    /// Evaluate `peers` as seen from `observer` at `now_ms`.
    ///
    /// The report keyed by `self_id`, stale reports, and reports with a
    /// non-finite position are left out of every count. The roster keeps
    /// the snapshot's iteration order. Among equally near peers the first
    /// in that order is chosen as nearest.
    pub fn evaluate(
        &self,
        observer: Coordinate,
        self_id: &PeerId,
        peers: &BTreeMap<PeerId, PeerReport>,
        now_ms: i64,
    ) -> ProximityResult {
        let roster: Vec<RosterEntry> = peers
            .iter()
            .filter(|(peer_id, _)| *peer_id != self_id)
            .filter(|(_, report)| report.position.is_finite())
            .filter(|(_, report)| !self.is_stale(report, now_ms))
            .map(|(peer_id, report)| RosterEntry {
                peer_id: peer_id.clone(),
                position: report.position,
                distance_km: haversine_km(observer, report.position),
                age_ms: report.age_ms(now_ms).max(0),
                attributes: report.attributes.clone(),
            })
            .collect();

        let nearby = roster
            .iter()
            .filter(|entry| entry.distance_km <= self.params.radius_km)
            .count();

        let nearest = roster
            .iter()
            .filter(|entry| entry.distance_km <= self.params.search_radius_km)
            .fold(None::<&RosterEntry>, |best, entry| match best {
                Some(b) if b.distance_km <= entry.distance_km => Some(b),
                _ => Some(entry),
            })
            .cloned();

        ProximityResult {
            active_count: u32::try_from(roster.len()).unwrap_or(u32::MAX),
            nearby_count: u32::try_from(nearby).unwrap_or(u32::MAX),
            roster,
            nearest,
        }
    }

    /// Whether `report` is too old to show at `now_ms`.
    pub const fn is_stale(&self, report: &PeerReport, now_ms: i64) -> bool {
        report.age_ms(now_ms) > self.params.max_age_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const JAKARTA: Coordinate = Coordinate::new(-6.2088, 106.8456);

    fn me() -> PeerId {
        PeerId::from("user_self0000")
    }

    fn peers(reports: Vec<PeerReport>) -> BTreeMap<PeerId, PeerReport> {
        reports
            .into_iter()
            .map(|r| (r.peer_id.clone(), r))
            .collect()
    }

    fn at(id: &str, lat: f64, lng: f64, reported_at_ms: i64) -> PeerReport {
        PeerReport::new(PeerId::from(id), Coordinate::new(lat, lng), reported_at_ms)
    }

    #[test]
    fn peer_at_observer_position_is_nearby_at_zero() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("bus", -6.2088, 106.8456, NOW)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);

        assert_eq!(result.active_count, 1);
        assert_eq!(result.nearby_count, 1);
        let d = result.roster.first().map_or(f64::NAN, |e| e.distance_km);
        assert!(d.abs() < f64::EPSILON);
        assert_eq!(result.nearest.map(|e| e.peer_id), Some(PeerId::from("bus")));
    }

    #[test]
    fn peer_a_kilometer_and_a_half_away_counts_as_nearby() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("bus", -6.2188, 106.8356, NOW)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);

        let d = result.roster.first().map_or(f64::NAN, |e| e.distance_km);
        assert!(d > 1.4 && d < 1.6, "got {d}");
        assert_eq!(result.nearby_count, 1);
        // Outside the 1 km search radius, so no nearest pick.
        assert!(result.nearest.is_none());
    }

    #[test]
    fn stale_reports_are_invisible() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("ghost", -6.2088, 106.8456, NOW - 301_000)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);

        assert_eq!(result.active_count, 0);
        assert_eq!(result.nearby_count, 0);
        assert!(result.roster.is_empty());
        assert!(result.nearest.is_none());
    }

    #[test]
    fn report_exactly_at_max_age_is_fresh() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("edge", -6.2088, 106.8456, NOW - DEFAULT_MAX_AGE_MS)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.active_count, 1);
    }

    #[test]
    fn own_report_is_filtered() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("user_self0000", -6.2088, 106.8456, NOW)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.active_count, 0);
        assert!(result.nearest.is_none());
    }

    #[test]
    fn empty_snapshot_yields_empty_result() {
        let engine = ProximityEngine::default();
        let result = engine.evaluate(JAKARTA, &me(), &BTreeMap::new(), NOW);
        assert_eq!(result, ProximityResult::default());
    }

    #[test]
    fn far_peers_are_active_but_not_nearby() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![
            at("near", -6.2090, 106.8450, NOW),
            at("far", -6.9, 107.6, NOW - 10_000),
        ]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);

        assert_eq!(result.active_count, 2);
        assert_eq!(result.nearby_count, 1);
        assert!(result.nearby_count <= result.active_count);
        let far = result.entry(&PeerId::from("far"));
        assert_eq!(far.map(|e| e.age_ms), Some(10_000));
    }

    #[test]
    fn nearest_picks_minimum_distance_inside_search_radius() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![
            at("a", -6.2130, 106.8456, NOW),
            at("b", -6.2095, 106.8456, NOW),
            at("c", -6.2089, 106.8456, NOW - 400_000),
        ]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        // "c" is closest but stale.
        assert_eq!(result.nearest.map(|e| e.peer_id), Some(PeerId::from("b")));
    }

    #[test]
    fn nearest_tie_keeps_first_in_roster_order() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![
            at("b", -6.2088, 106.8456, NOW),
            at("a", -6.2088, 106.8456, NOW),
        ]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.nearest.map(|e| e.peer_id), Some(PeerId::from("a")));
    }

    #[test]
    fn roster_keeps_snapshot_order() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![
            at("zeta", -6.3, 106.8, NOW),
            at("alpha", -6.21, 106.84, NOW),
        ]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        let ids: Vec<&str> = result.roster.iter().map(|e| e.peer_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn future_reports_are_fresh_with_zero_age() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![at("ahead", -6.2088, 106.8456, NOW + 5_000)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.roster.first().map(|e| e.age_ms), Some(0));
    }

    #[test]
    fn non_finite_positions_are_ignored() {
        let engine = ProximityEngine::default();
        let snapshot = peers(vec![
            at("bad", f64::NAN, 106.8, NOW),
            at("good", -6.2088, 106.8456, NOW),
        ]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.active_count, 1);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let engine = ProximityEngine::new(ProximityParams {
            radius_km: 5.0,
            max_age_ms: 60_000,
            search_radius_km: 5.0,
        });
        let snapshot = peers(vec![
            at("a", -6.20, 106.84, NOW - 1_000),
            at("b", -6.25, 106.90, NOW - 70_000),
            at("c", -6.22, 106.83, NOW),
        ]);
        let first = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        let second = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(first, second);
        assert_eq!(first.active_count, 2);
    }

    #[test]
    fn zero_radius_still_counts_identical_position() {
        let engine = ProximityEngine::new(ProximityParams {
            radius_km: 0.0,
            max_age_ms: DEFAULT_MAX_AGE_MS,
            search_radius_km: 0.0,
        });
        let snapshot = peers(vec![at("same", -6.2088, 106.8456, NOW)]);
        let result = engine.evaluate(JAKARTA, &me(), &snapshot, NOW);
        assert_eq!(result.nearby_count, 1);
        assert!(result.nearest.is_some());
    }
}
