//! Radar server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which launches the HTTP + `WebSocket` server
//! on a background Tokio task so it runs concurrently with the tracker
//! loop.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the radar server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the radar HTTP server on a background Tokio task.
///
/// The server runs until the Tokio runtime is shut down or the task is
/// aborted. The caller should hold the returned handle and abort it
/// during clean shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the configured address does not
/// parse. Bind failures happen on the background task and are logged.
pub fn spawn_observer(
    config: ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = config.socket_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::start_server(&config, state).await {
            tracing::error!(error = %e, "Radar server exited with error");
        }
    });

    tracing::info!(%addr, "Radar server spawned on background task");

    Ok(handle)
}
