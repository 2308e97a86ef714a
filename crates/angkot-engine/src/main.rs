//! Angkot Radar service binary.
//!
//! Wires together configuration, logging, the tracker loop, and the radar
//! API. The browser map page talks to the API: it forwards location fixes
//! and realtime feed snapshots in, and renders what comes back out.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `angkot-config.yaml` (defaults if missing)
//! 2. Initialize structured logging (tracing)
//! 3. Generate the local peer id and create the tracker
//! 4. Start the radar API server
//! 5. Install the Ctrl-C handler
//! 6. Run the tracker loop until shutdown

mod error;
mod render_callback;

use std::path::Path;
use std::sync::Arc;

use angkot_core::clock::SystemClock;
use angkot_core::config::{LoggingConfig, RadarConfig};
use angkot_core::runner::{self, LoopTiming};
use angkot_core::Tracker;
use angkot_observer::{AppState, ServerConfig};
use angkot_types::PeerId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::render_callback::RadarCallback;

/// Path of the configuration file, relative to the working directory.
const CONFIG_PATH: &str = "angkot-config.yaml";

/// Capacity of the tracker event channel.
const EVENT_CAPACITY: usize = 64;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging, or the API server fails
/// to start.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging depends on it, so failures here are
    //    reported through the returned error only.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(from_file, "angkot-engine starting");
    info!(
        radius_km = config.tracking.radius_km,
        max_age_ms = config.tracking.max_age_ms,
        search_radius_km = config.tracking.search_radius_km,
        poll_interval_ms = config.tracking.poll_interval_ms,
        cleanup_interval_ms = config.tracking.cleanup_interval_ms,
        "Configuration loaded"
    );

    // 3. Create the tracker.
    let self_id = PeerId::generate();
    let mut tracker = Tracker::from_config(self_id.clone(), &config);
    let position = tracker.observer().position;
    info!(
        self_id = %self_id,
        lat = position.lat,
        lng = position.lng,
        "Tracker created at default location"
    );

    // 4. Start the radar API server.
    let (handle, events) = runner::channel(EVENT_CAPACITY);
    let app_state = Arc::new(AppState::with_tracker(handle.clone()));
    let server_config = ServerConfig::from(&config.observer);
    let observer_handle = angkot_observer::spawn_observer(server_config, Arc::clone(&app_state))?;
    info!(
        host = config.observer.host,
        port = config.observer.port,
        "Radar API server started"
    );

    // 5. Stop the loop on Ctrl-C.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Ctrl-C received, shutting down");
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Tracker loop already stopped");
        }
    });

    // 6. Run the tracker loop.
    let mut callback = RadarCallback::new(app_state);
    let summary = runner::run_tracker(
        &mut tracker,
        events,
        LoopTiming::from_config(&config.tracking),
        &SystemClock,
        &mut callback,
    )
    .await;

    observer_handle.abort();

    info!(
        end_reason = ?summary.end_reason,
        events_applied = summary.events_applied,
        updates_published = summary.updates_published,
        "angkot-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `angkot-config.yaml`.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(RadarConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((RadarConfig::from_file(config_path)?, true))
    } else {
        let mut config = RadarConfig::default();
        config.observer.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
