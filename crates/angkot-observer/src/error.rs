//! HTTP error mapping for the radar API.
//!
//! Handlers return [`ObserverError`]; its `IntoResponse` impl turns it into
//! a JSON body `{"error": ..., "status": ...}` with the matching code.

use angkot_core::TrackerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure of a radar API request.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// Unknown driver, or nothing published yet. Answers 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body could not be encoded. Answers 500.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad `order`, `within_km`, or path id. Answers 400.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No tracker loop to queue the event on. Answers 503.
    #[error("tracker unavailable: {0}")]
    Unavailable(String),

    /// Anything else the tracker reported. Answers 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TrackerError> for ObserverError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::ChannelClosed => Self::Unavailable(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl ObserverError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            Self::Serialization(e) => format!("JSON error: {e}"),
            Self::NotFound(msg)
            | Self::InvalidQuery(msg)
            | Self::Unavailable(msg)
            | Self::Internal(msg) => msg,
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_channel_is_unavailable() {
        let err = ObserverError::from(TrackerError::ChannelClosed);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ObserverError::from(TrackerError::FeedUnavailable {
            message: "down".to_owned(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
