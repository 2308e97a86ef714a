//! Radar API server for Angkot Radar.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/radar`) for live radar updates via
//!   [`tokio::sync::broadcast`]
//! - **Read endpoints** for the proximity result, roster, nearby search,
//!   map markers, status, self report, and stale ids
//! - **Ingest endpoints** that forward location fixes, feed snapshots, and
//!   driver control into the tracker loop
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The tracker loop owns all state. After every change it publishes a
//! [`RadarSnapshot`] through the `watch` channel in [`AppState`] and
//! broadcasts the same update; REST reads take a copy of that snapshot, so
//! a slow reader never costs the loop a write. Ingest handlers only queue
//! events on the loop's channel.
//!
//! [`RadarSnapshot`]: state::RadarSnapshot

pub mod error;
pub mod handlers;
pub mod ingest;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::{AppState, RadarBroadcast, RadarSnapshot};
