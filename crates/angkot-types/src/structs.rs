//! Core data structs: coordinates, peer reports, observer state, and the
//! derived proximity result handed to rendering collaborators.
//!
//! All timestamps are integer milliseconds since the Unix epoch, matching
//! what the browser and the realtime feed produce.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{FeedStatus, LocationStatus};
use crate::ids::PeerId;

/// Open map of display metadata attached to a report (plate number,
/// route name, vehicle type, ...).
pub type Attributes = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A latitude/longitude pair in decimal degrees.
///
/// No range validation is performed. Out-of-range values are accepted and
/// produce meaningless but well-defined distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// Latitude in degrees, nominally in \[-90, 90\].
    pub lat: f64,
    /// Longitude in degrees, nominally in \[-180, 180\].
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite numbers.
    pub const fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

// ---------------------------------------------------------------------------
// PeerReport
// ---------------------------------------------------------------------------

/// The latest self-reported position of a peer.
///
/// A newer report for the same `peer_id` replaces the older one; the
/// timestamp supplied by the feed is trusted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PeerReport {
    /// Identity of the reporting peer.
    pub peer_id: PeerId,
    /// Reported position.
    pub position: Coordinate,
    /// When the peer produced the report.
    #[ts(type = "number")]
    pub reported_at_ms: i64,
    /// Display metadata carried alongside the position.
    #[serde(default)]
    pub attributes: Attributes,
}

impl PeerReport {
    /// Create a report without attributes.
    pub fn new(peer_id: PeerId, position: Coordinate, reported_at_ms: i64) -> Self {
        Self {
            peer_id,
            position,
            reported_at_ms,
            attributes: Attributes::new(),
        }
    }

    /// Attach a display attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    /// Milliseconds elapsed between the report and `now_ms`.
    ///
    /// Negative when the report claims to come from the future.
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.reported_at_ms)
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// A single reading delivered by the location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LocationFix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported accuracy radius in meters.
    pub accuracy_m: f64,
    /// When the fix was taken.
    #[ts(type = "number")]
    pub timestamp_ms: i64,
}

impl LocationFix {
    /// The fix position as a [`Coordinate`].
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// The local user's last known position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ObserverState {
    /// Last known position.
    pub position: Coordinate,
    /// Accuracy of the last fix, absent while on the default location.
    pub accuracy_m: Option<f64>,
    /// When the position was last updated (0 before the first fix).
    #[ts(type = "number")]
    pub last_updated_ms: i64,
}

impl ObserverState {
    /// Observer state placed at a default position, before any fix.
    pub const fn at(position: Coordinate) -> Self {
        Self {
            position,
            accuracy_m: None,
            last_updated_ms: 0,
        }
    }

    /// Whether at least one real fix has been applied.
    pub const fn has_fix(&self) -> bool {
        self.accuracy_m.is_some()
    }
}

/// The report the local user publishes upstream while acting as a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SelfReport {
    /// The local user's peer id.
    pub peer_id: PeerId,
    /// Current observer position.
    pub position: Coordinate,
    /// When the report was produced.
    #[ts(type = "number")]
    pub timestamp_ms: i64,
    /// Vehicle display metadata.
    #[serde(default)]
    pub attributes: Attributes,
}

// ---------------------------------------------------------------------------
// Proximity result
// ---------------------------------------------------------------------------

/// One fresh peer as seen from the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RosterEntry {
    /// Identity of the peer.
    pub peer_id: PeerId,
    /// Reported position of the peer.
    pub position: Coordinate,
    /// Great-circle distance from the observer in kilometers.
    pub distance_km: f64,
    /// Age of the report in milliseconds (never negative).
    #[ts(type = "number")]
    pub age_ms: i64,
    /// Display metadata from the report.
    pub attributes: Attributes,
}

impl RosterEntry {
    /// String attribute lookup, e.g. `plateNumber` or `route`.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Everything derived from one evaluation of the peer roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProximityResult {
    /// Peers that survived self and staleness filtering.
    pub active_count: u32,
    /// Subset of active peers within the detection radius.
    pub nearby_count: u32,
    /// Active peers in peer-id order.
    pub roster: Vec<RosterEntry>,
    /// Closest active peer within the search radius, if any.
    pub nearest: Option<RosterEntry>,
}

impl ProximityResult {
    /// Roster entries ordered by ascending distance.
    ///
    /// Ties keep their roster order.
    pub fn nearest_first(&self) -> Vec<&RosterEntry> {
        let mut entries: Vec<&RosterEntry> = self.roster.iter().collect();
        entries.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        entries
    }

    /// Roster entries no farther than `radius_km` from the observer.
    pub fn within(&self, radius_km: f64) -> impl Iterator<Item = &RosterEntry> {
        self.roster
            .iter()
            .filter(move |entry| entry.distance_km <= radius_km)
    }

    /// Look up a roster entry by peer id.
    pub fn entry(&self, peer_id: &PeerId) -> Option<&RosterEntry> {
        self.roster.iter().find(|entry| &entry.peer_id == peer_id)
    }
}

// ---------------------------------------------------------------------------
// Tracker status
// ---------------------------------------------------------------------------

/// Health and settings of a tracker, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TrackerStatus {
    /// The local user's peer id.
    pub self_id: PeerId,
    /// Last known observer position.
    pub observer: ObserverState,
    /// State of the location source.
    pub location: LocationStatus,
    /// State of the snapshot feed.
    pub feed: FeedStatus,
    /// Whether the local user is publishing as a driver.
    pub driver_mode: bool,
    /// Reports held by the store, stale ones included.
    pub stored_peers: u32,
    /// Detection radius in kilometers.
    pub radius_km: f64,
    /// Nearest-vehicle search radius in kilometers.
    pub search_radius_km: f64,
    /// Marker display radius in kilometers.
    pub marker_radius_km: f64,
    /// Staleness threshold in milliseconds.
    #[ts(type = "number")]
    pub max_age_ms: i64,
}
