//! Status enumerations shared between the tracker and its collaborators.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Why the location source could not deliver a fix.
///
/// Mirrors the error categories of the browser geolocation API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LocationFailure {
    /// The user refused location access.
    PermissionDenied,
    /// The device could not determine a position.
    Unavailable,
    /// No fix arrived before the source's deadline.
    Timeout,
}

impl LocationFailure {
    /// Short human-readable description of the failure.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::PermissionDenied => "location access denied",
            Self::Unavailable => "location information unavailable",
            Self::Timeout => "location request timed out",
        }
    }
}

impl core::fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.describe())
    }
}

/// State of the observer's location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(tag = "state", content = "failure", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LocationStatus {
    /// No fix and no failure reported yet; the default location is in use.
    #[default]
    Pending,
    /// The most recent report from the source was a valid fix.
    Ok,
    /// The most recent report was a failure. The last known position is kept.
    Failed(LocationFailure),
}

/// Reachability of the remote snapshot feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FeedStatus {
    /// No snapshot received yet.
    #[default]
    Waiting,
    /// The last feed event was a snapshot.
    Connected,
    /// The feed reported an error. The last snapshot stays in effect.
    Disconnected,
}
