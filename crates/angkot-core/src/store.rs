//! The roster of latest peer reports.
//!
//! [`PositionStore`] keeps the contents behind an [`Arc`]. Readers get a
//! cheap clone of that pointer from [`PositionStore::snapshot`]; writers
//! copy on write. A full replacement builds the new map first and swaps
//! the pointer in one assignment, so a snapshot is always entirely from
//! before or entirely from after a [`PositionStore::replace_all`].

use std::collections::BTreeMap;
use std::sync::Arc;

use angkot_types::{PeerId, PeerReport};
use tracing::{debug, warn};

use crate::error::TrackerError;

/// Immutable point-in-time view of the store.
pub type StoreSnapshot = Arc<BTreeMap<PeerId, PeerReport>>;

/// Outcome of a [`PositionStore::replace_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceStats {
    /// Reports now held by the store.
    pub accepted: u32,
    /// Reports dropped as malformed.
    pub rejected: u32,
    /// Reports dropped because they carried the owner's id.
    pub skipped_self: u32,
}

/// Latest report per peer, keyed by peer id.
#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    /// Peer id of the local user; reports under this id are never stored.
    owner: Option<PeerId>,
    entries: StoreSnapshot,
}

impl PositionStore {
    /// Create an empty store with no owner filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that ignores reports carrying `owner`'s id.
    pub fn with_owner(owner: PeerId) -> Self {
        Self {
            owner: Some(owner),
            entries: StoreSnapshot::default(),
        }
    }

    /// Insert or replace the report for `report.peer_id`.
    ///
    /// A report under the owner's id is silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidReport`] if the peer id is empty or
    /// the position is not finite.
    pub fn upsert(&mut self, report: PeerReport) -> Result<(), TrackerError> {
        validate(&report)?;
        if self.is_owner(&report.peer_id) {
            debug!(peer_id = %report.peer_id, "ignoring self report");
            return Ok(());
        }
        Arc::make_mut(&mut self.entries).insert(report.peer_id.clone(), report);
        Ok(())
    }

    /// Remove the report for `peer_id`. Returns whether one was present.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        if !self.entries.contains_key(peer_id) {
            return false;
        }
        Arc::make_mut(&mut self.entries).remove(peer_id).is_some()
    }

    /// Swap the entire contents for `reports`.
    ///
    /// Malformed reports are logged and skipped; they never prevent the
    /// rest of the snapshot from being applied. When several reports share
    /// an id the last one wins.
    pub fn replace_all(&mut self, reports: impl IntoIterator<Item = PeerReport>) -> ReplaceStats {
        let mut stats = ReplaceStats::default();
        let mut next = BTreeMap::new();

        for report in reports {
            if let Err(e) = validate(&report) {
                warn!(error = %e, "dropping malformed report from snapshot");
                stats.rejected = stats.rejected.saturating_add(1);
                continue;
            }
            if self.is_owner(&report.peer_id) {
                stats.skipped_self = stats.skipped_self.saturating_add(1);
                continue;
            }
            next.insert(report.peer_id.clone(), report);
        }

        stats.accepted = u32::try_from(next.len()).unwrap_or(u32::MAX);
        self.entries = Arc::new(next);
        stats
    }

    /// Drop every report. Returns the ids that were held.
    ///
    /// Snapshots taken earlier keep their contents.
    pub fn clear(&mut self) -> Vec<PeerId> {
        let ids = self.entries.keys().cloned().collect();
        self.entries = StoreSnapshot::default();
        ids
    }

    /// Point-in-time copy of the contents.
    ///
    /// The returned map is shared and immutable; later writes to the store
    /// do not affect it.
    pub fn snapshot(&self) -> StoreSnapshot {
        Arc::clone(&self.entries)
    }

    /// Report currently held for `peer_id`.
    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerReport> {
        self.entries.get(peer_id)
    }

    /// Number of stored reports, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no reports.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of reports older than `max_age_ms` at `now_ms`.
    ///
    /// The store itself keeps them; callers use this list to ask the
    /// upstream database to delete them.
    pub fn stale_ids(&self, now_ms: i64, max_age_ms: i64) -> Vec<PeerId> {
        self.entries
            .values()
            .filter(|report| report.age_ms(now_ms) > max_age_ms)
            .map(|report| report.peer_id.clone())
            .collect()
    }

    fn is_owner(&self, peer_id: &PeerId) -> bool {
        self.owner.as_ref() == Some(peer_id)
    }
}

fn validate(report: &PeerReport) -> Result<(), TrackerError> {
    if report.peer_id.is_empty() {
        return Err(TrackerError::invalid_report(&report.peer_id, "empty peer id"));
    }
    if !report.position.is_finite() {
        return Err(TrackerError::invalid_report(
            &report.peer_id,
            "position is not finite",
        ));
    }
    Ok(())
}
