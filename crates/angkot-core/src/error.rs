//! Error types for the `angkot-core` crate.
//!
//! [`TrackerError`] covers everything the store, the feed decoder, and the
//! tracker can reject. None of these variants abort an evaluation: malformed
//! input is dropped and reported, and the last good state stays in effect.

use angkot_types::{LocationFailure, PeerId};

/// Errors surfaced by the tracking core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// A peer report was malformed and was not stored.
    #[error("invalid report for peer '{peer_id}': {reason}")]
    InvalidReport {
        /// The offending peer id (may be empty).
        peer_id: PeerId,
        /// What was wrong with the report.
        reason: String,
    },

    /// A location fix carried unusable numbers and was ignored.
    #[error("invalid location fix: {reason}")]
    InvalidFix {
        /// What was wrong with the fix.
        reason: String,
    },

    /// The location source could not produce a fix.
    #[error("location unavailable: {0}")]
    LocationUnavailable(LocationFailure),

    /// The remote snapshot feed could not be reached.
    #[error("feed unavailable: {message}")]
    FeedUnavailable {
        /// Description reported by the feed collaborator.
        message: String,
    },

    /// The tracker loop has stopped and no longer accepts events.
    #[error("tracker channel closed")]
    ChannelClosed,
}

impl TrackerError {
    /// Shorthand for an [`TrackerError::InvalidReport`].
    pub fn invalid_report(peer_id: &PeerId, reason: impl Into<String>) -> Self {
        Self::InvalidReport {
            peer_id: peer_id.clone(),
            reason: reason.into(),
        }
    }
}
