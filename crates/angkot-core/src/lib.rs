//! Position tracking and proximity evaluation for Angkot Radar.
//!
//! This crate owns the roster of peer reports and everything derived from
//! it: great-circle distances, staleness filtering, nearby counts, and
//! nearest-vehicle selection.
//!
//! # Modules
//!
//! - [`clock`] -- [`TimeSource`] trait with system and manual clocks.
//! - [`config`] -- Configuration loading from `angkot-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`TrackerError`].
//! - [`feed`] -- Decoding of realtime feed snapshots and encoding of the
//!   self report.
//! - [`format`] -- Display helpers (age buckets, distances, coordinates).
//! - [`geo`] -- Haversine distance.
//! - [`proximity`] -- The pure [`ProximityEngine`].
//! - [`runner`] -- The async tracker loop and its producer handle.
//! - [`store`] -- The copy-on-write [`PositionStore`].
//! - [`tracker`] -- The [`Tracker`] state machine.
//!
//! [`TimeSource`]: clock::TimeSource
//! [`TrackerError`]: error::TrackerError
//! [`ProximityEngine`]: proximity::ProximityEngine
//! [`PositionStore`]: store::PositionStore
//! [`Tracker`]: tracker::Tracker

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod format;
pub mod geo;
pub mod proximity;
pub mod runner;
pub mod store;
pub mod tracker;

pub use error::TrackerError;
pub use runner::{
    LoopEnd, LoopSummary, LoopTiming, NoOpCallback, RenderCallback, TrackerEvent, TrackerHandle,
    TrackerUpdate, run_tracker,
};
pub use tracker::Tracker;
