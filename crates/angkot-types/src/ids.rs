//! Identifier wrappers for peers reporting into the presence feed.
//!
//! Peer identifiers are opaque strings chosen by whoever publishes the
//! report (the realtime database key). They are never parsed; the only
//! structural requirement is that they are non-empty.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Prefix used for locally generated peer identifiers.
pub const PEER_ID_PREFIX: &str = "user_";

/// Number of random characters appended to [`PEER_ID_PREFIX`].
const PEER_ID_RANDOM_LEN: usize = 9;

/// Opaque identifier of a peer (driver) in the presence feed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PeerId(pub String);

impl PeerId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier for the local user.
    ///
    /// The shape is `user_` followed by nine lowercase alphanumerics,
    /// drawn from a UUID v4 so collisions between devices are unlikely.
    pub fn generate() -> Self {
        let random: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(PEER_ID_RANDOM_LEN)
            .collect();
        Self(format!("{PEER_ID_PREFIX}{random}"))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (and therefore invalid).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shortened form for display, e.g. `user_ab1...`.
    pub fn short(&self) -> String {
        let head: String = self.0.chars().take(8).collect();
        if head.len() < self.0.len() {
            format!("{head}...")
        } else {
            head
        }
    }
}

impl core::fmt::Display for PeerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}
