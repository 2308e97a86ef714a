//! Presentation helpers for roster entries and observer state.
//!
//! Pure string formatting; no side effects.

use angkot_types::Coordinate;
use serde::Serialize;

const MS_PER_SECOND: i64 = 1_000;
const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3_600;

/// How long ago a report was made, bucketed for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum AgeBucket {
    /// Under a minute; whole seconds.
    Seconds(i64),
    /// Under an hour; whole minutes.
    Minutes(i64),
    /// An hour or more; whole hours.
    Hours(i64),
}

impl core::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Seconds(n) => write!(f, "{n} seconds ago"),
            Self::Minutes(n) => write!(f, "{n} minutes ago"),
            Self::Hours(n) => write!(f, "{n} hours ago"),
        }
    }
}

/// Bucket an age in milliseconds.
///
/// Thresholds sit at 60 s and 3600 s and every step uses floor division,
/// so 59 999 ms is still "59 seconds ago". Negative ages read as zero.
pub fn age_bucket(age_ms: i64) -> AgeBucket {
    let seconds = age_ms.max(0).div_euclid(MS_PER_SECOND);
    if seconds < SECONDS_PER_MINUTE {
        AgeBucket::Seconds(seconds)
    } else if seconds < SECONDS_PER_HOUR {
        AgeBucket::Minutes(seconds.div_euclid(SECONDS_PER_MINUTE))
    } else {
        AgeBucket::Hours(seconds.div_euclid(SECONDS_PER_HOUR))
    }
}

/// Distance with one decimal, e.g. `1.6 km`.
pub fn format_distance_km(distance_km: f64) -> String {
    format!("{distance_km:.1} km")
}

/// Coordinate with six decimals, e.g. `-6.208800, 106.845600`.
pub fn format_coordinate(coordinate: Coordinate) -> String {
    format!("{:.6}, {:.6}", coordinate.lat, coordinate.lng)
}

/// Accuracy radius rounded to whole meters, e.g. `±12 m`.
pub fn format_accuracy(accuracy_m: f64) -> String {
    format!("±{accuracy_m:.0} m")
}
