//! Shared type definitions for the Angkot Radar proximity tracker.
//!
//! Every type that crosses a crate or process boundary lives here: the
//! tracker core produces them, the observer API serializes them, and the
//! browser collaborator consumes the `TypeScript` bindings generated via
//! `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- The opaque [`PeerId`] newtype and local id generation
//! - [`enums`] -- Location and feed status enumerations
//! - [`structs`] -- Coordinates, peer reports, observer state, and the
//!   derived [`ProximityResult`] and [`TrackerStatus`]

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{FeedStatus, LocationFailure, LocationStatus};
pub use ids::{PEER_ID_PREFIX, PeerId};
pub use structs::{
    Attributes, Coordinate, LocationFix, ObserverState, PeerReport, ProximityResult, RosterEntry,
    SelfReport, TrackerStatus,
};
