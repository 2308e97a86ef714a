//! Tracker event loop.
//!
//! [`run_tracker`] owns the [`Tracker`] for the lifetime of the service and
//! serializes everything that touches it:
//!
//! - **Producer events** from the location source and the snapshot feed,
//!   delivered through a [`TrackerHandle`]
//! - **Poll timer**: publishes the self report while driver mode is on
//! - **Cleanup timer**: reports stale peer ids for upstream deletion
//!
//! Records the loop wants deleted upstream (stale peers, a wiped roster,
//! the local record once driver mode goes off) are handed to the callback
//! as ids; the browser side performs the actual deletion.
//!
//! After every state change the loop hands a fresh [`TrackerUpdate`] to the
//! [`RenderCallback`]. The loop ends on [`TrackerEvent::Shutdown`] or once
//! every handle has been dropped.

use std::time::Duration;

use angkot_types::{
    LocationFailure, LocationFix, PeerId, PeerReport, ProximityResult, SelfReport, TrackerStatus,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::TimeSource;
use crate::config::TrackingConfig;
use crate::error::TrackerError;
use crate::tracker::Tracker;

/// Input accepted by the tracker loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A fix from the location source.
    Fix(LocationFix),
    /// The location source failed.
    FixFailed(LocationFailure),
    /// A raw snapshot payload from the feed.
    Snapshot(serde_json::Value),
    /// An already decoded snapshot.
    Reports(Vec<PeerReport>),
    /// The feed became unreachable.
    FeedFailed(String),
    /// A peer unregistered.
    RemovePeer(PeerId),
    /// Switch driver mode on or off.
    SetDriverMode(bool),
    /// Wipe every peer from the roster.
    ClearAll,
    /// Stop the loop.
    Shutdown,
}

/// Everything the rendering side needs after a state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerUpdate {
    /// Roster and counts at `evaluated_at_ms`.
    pub result: ProximityResult,
    /// Tracker status at `evaluated_at_ms`.
    pub status: TrackerStatus,
    /// When the evaluation ran.
    pub evaluated_at_ms: i64,
}

/// Receiver of tracker output.
///
/// Implementations update the published snapshot, push to `WebSocket`
/// clients, forward the self report upstream, and so on.
pub trait RenderCallback: Send {
    /// Called with a fresh evaluation after every state change.
    fn on_update(&mut self, update: &TrackerUpdate);

    /// Called every poll interval while driver mode is on.
    fn on_self_report(&mut self, report: &SelfReport);

    /// Called by the cleanup timer when stale peers exist.
    fn on_stale_peers(&mut self, peers: &[PeerId]);

    /// Called when driver mode goes off; the local record should be
    /// deleted upstream.
    fn on_self_retracted(&mut self, peer_id: &PeerId);

    /// Called after the roster was wiped, with the ids it held.
    fn on_cleared(&mut self, peers: &[PeerId]);

    /// Called when an event was rejected or a source failed.
    fn on_error(&mut self, error: &TrackerError);
}

/// A callback that ignores everything.
pub struct NoOpCallback;

impl RenderCallback for NoOpCallback {
    fn on_update(&mut self, _update: &TrackerUpdate) {}
    fn on_self_report(&mut self, _report: &SelfReport) {}
    fn on_stale_peers(&mut self, _peers: &[PeerId]) {}
    fn on_self_retracted(&mut self, _peer_id: &PeerId) {}
    fn on_cleared(&mut self, _peers: &[PeerId]) {}
    fn on_error(&mut self, _error: &TrackerError) {}
}

/// Cloneable producer side of the tracker loop.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerEvent>,
}

/// Create a bounded event channel for [`run_tracker`].
pub fn channel(capacity: usize) -> (TrackerHandle, mpsc::Receiver<TrackerEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TrackerHandle { tx }, rx)
}

impl TrackerHandle {
    /// Queue an event.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn send(&self, event: TrackerEvent) -> Result<(), TrackerError> {
        if self.tx.send(event).await.is_err() {
            return Err(TrackerError::ChannelClosed);
        }
        Ok(())
    }

    /// Queue a location fix.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn push_fix(&self, fix: LocationFix) -> Result<(), TrackerError> {
        self.send(TrackerEvent::Fix(fix)).await
    }

    /// Queue a location failure.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn push_fix_failure(&self, failure: LocationFailure) -> Result<(), TrackerError> {
        self.send(TrackerEvent::FixFailed(failure)).await
    }

    /// Queue a raw feed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn push_snapshot(&self, raw: serde_json::Value) -> Result<(), TrackerError> {
        self.send(TrackerEvent::Snapshot(raw)).await
    }

    /// Queue a feed failure.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn push_feed_failure(&self, message: String) -> Result<(), TrackerError> {
        self.send(TrackerEvent::FeedFailed(message)).await
    }

    /// Queue a peer removal.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn remove_peer(&self, peer_id: PeerId) -> Result<(), TrackerError> {
        self.send(TrackerEvent::RemovePeer(peer_id)).await
    }

    /// Queue a driver mode switch.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn set_driver_mode(&self, enabled: bool) -> Result<(), TrackerError> {
        self.send(TrackerEvent::SetDriverMode(enabled)).await
    }

    /// Queue a wipe of the whole roster.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has stopped.
    pub async fn clear_all(&self) -> Result<(), TrackerError> {
        self.send(TrackerEvent::ClearAll).await
    }

    /// Ask the loop to stop.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] if the loop has already
    /// stopped.
    pub async fn shutdown(&self) -> Result<(), TrackerError> {
        self.send(TrackerEvent::Shutdown).await
    }
}

/// Timer periods for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Self-report publishing period.
    pub poll_interval: Duration,
    /// Stale-peer cleanup period.
    pub cleanup_interval: Duration,
}

impl LoopTiming {
    /// Periods from tracking configuration.
    pub const fn from_config(config: &TrackingConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            cleanup_interval: config.cleanup_interval(),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// A [`TrackerEvent::Shutdown`] was received.
    Shutdown,
    /// Every [`TrackerHandle`] was dropped.
    ProducersGone,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Producer events processed, rejected ones included.
    pub events_applied: u64,
    /// Updates handed to the callback.
    pub updates_published: u64,
    /// Why the loop stopped.
    pub end_reason: LoopEnd,
}

/// Run the tracker loop until shutdown.
///
/// An update is published once at start, after every event that changed
/// state, and on every cleanup tick so that expiring reports drop out of
/// the published roster even when no new snapshot arrives.
pub async fn run_tracker(
    tracker: &mut Tracker,
    mut events: mpsc::Receiver<TrackerEvent>,
    timing: LoopTiming,
    clock: &dyn TimeSource,
    callback: &mut dyn RenderCallback,
) -> LoopSummary {
    let mut poll = periodic(timing.poll_interval);
    let mut cleanup = periodic(timing.cleanup_interval);
    let mut events_applied: u64 = 0;
    let mut updates_published: u64 = 0;

    info!(
        self_id = %tracker.self_id(),
        poll_interval_ms = timing.poll_interval.as_millis(),
        cleanup_interval_ms = timing.cleanup_interval.as_millis(),
        "Tracker loop starting"
    );

    publish(tracker, clock, callback);
    updates_published = updates_published.saturating_add(1);

    let end_reason = loop {
        tokio::select! {
            biased;

            event = events.recv() => {
                let Some(event) = event else {
                    break LoopEnd::ProducersGone;
                };
                if matches!(event, TrackerEvent::Shutdown) {
                    break LoopEnd::Shutdown;
                }
                events_applied = events_applied.saturating_add(1);
                if apply_event(tracker, event, clock, callback) {
                    publish(tracker, clock, callback);
                    updates_published = updates_published.saturating_add(1);
                }
            }

            _ = poll.tick() => {
                if let Some(report) = tracker.self_report(clock.now_ms()) {
                    debug!(lat = report.position.lat, lng = report.position.lng, "Publishing self report");
                    callback.on_self_report(&report);
                }
            }

            _ = cleanup.tick() => {
                let stale = tracker.stale_peers(clock.now_ms());
                if !stale.is_empty() {
                    debug!(count = stale.len(), "Stale peers found");
                    callback.on_stale_peers(&stale);
                }
                publish(tracker, clock, callback);
                updates_published = updates_published.saturating_add(1);
            }
        }
    };

    info!(
        reason = ?end_reason,
        events_applied,
        updates_published,
        "Tracker loop stopped"
    );

    LoopSummary {
        events_applied,
        updates_published,
        end_reason,
    }
}

/// Apply one producer event. Returns whether the published view changed.
fn apply_event(
    tracker: &mut Tracker,
    event: TrackerEvent,
    clock: &dyn TimeSource,
    callback: &mut dyn RenderCallback,
) -> bool {
    match event {
        TrackerEvent::Fix(fix) => match tracker.apply_fix(&fix) {
            Ok(()) => true,
            Err(e) => {
                callback.on_error(&e);
                false
            }
        },
        TrackerEvent::FixFailed(failure) => {
            let e = tracker.apply_fix_failure(failure);
            callback.on_error(&e);
            true
        }
        TrackerEvent::Snapshot(raw) => match tracker.apply_feed_payload(&raw) {
            Ok(_) => true,
            Err(e) => {
                callback.on_error(&e);
                false
            }
        },
        TrackerEvent::Reports(reports) => {
            tracker.apply_snapshot(reports);
            true
        }
        TrackerEvent::FeedFailed(message) => {
            let e = tracker.apply_feed_failure(&message);
            callback.on_error(&e);
            true
        }
        TrackerEvent::RemovePeer(peer_id) => tracker.remove_peer(&peer_id),
        TrackerEvent::SetDriverMode(enabled) => {
            if !tracker.set_driver_mode(enabled) {
                return false;
            }
            if enabled {
                // Publish right away instead of waiting for the first poll tick.
                if let Some(report) = tracker.self_report(clock.now_ms()) {
                    callback.on_self_report(&report);
                }
            } else {
                callback.on_self_retracted(tracker.self_id());
            }
            true
        }
        TrackerEvent::ClearAll => {
            let cleared = tracker.clear_all();
            if cleared.is_empty() {
                return false;
            }
            callback.on_cleared(&cleared);
            true
        }
        TrackerEvent::Shutdown => false,
    }
}

fn publish(tracker: &Tracker, clock: &dyn TimeSource, callback: &mut dyn RenderCallback) {
    let now_ms = clock.now_ms();
    let update = TrackerUpdate {
        result: tracker.evaluate(now_ms),
        status: tracker.status(),
        evaluated_at_ms: now_ms,
    };
    callback.on_update(&update);
}

/// An interval whose first tick is one full period away.
fn periodic(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use angkot_types::Coordinate;
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::proximity::ProximityParams;

    const NOW: i64 = 1_700_000_000_000;

    #[derive(Default)]
    struct Recorder {
        updates: Vec<TrackerUpdate>,
        self_reports: Vec<SelfReport>,
        stale: Vec<Vec<PeerId>>,
        retracted: Vec<PeerId>,
        cleared: Vec<Vec<PeerId>>,
        errors: Vec<TrackerError>,
    }

    impl RenderCallback for Recorder {
        fn on_update(&mut self, update: &TrackerUpdate) {
            self.updates.push(update.clone());
        }
        fn on_self_report(&mut self, report: &SelfReport) {
            self.self_reports.push(report.clone());
        }
        fn on_stale_peers(&mut self, peers: &[PeerId]) {
            self.stale.push(peers.to_vec());
        }
        fn on_self_retracted(&mut self, peer_id: &PeerId) {
            self.retracted.push(peer_id.clone());
        }
        fn on_cleared(&mut self, peers: &[PeerId]) {
            self.cleared.push(peers.to_vec());
        }
        fn on_error(&mut self, error: &TrackerError) {
            self.errors.push(error.clone());
        }
    }

    fn tracker() -> Tracker {
        Tracker::new(
            PeerId::from("user_me"),
            Coordinate::new(-6.2088, 106.8456),
            ProximityParams::default(),
        )
    }

    fn timing(poll_ms: u64, cleanup_ms: u64) -> LoopTiming {
        LoopTiming {
            poll_interval: Duration::from_millis(poll_ms),
            cleanup_interval: Duration::from_millis(cleanup_ms),
        }
    }

    fn fix(lat: f64, lng: f64) -> LocationFix {
        LocationFix {
            lat,
            lng,
            accuracy_m: 10.0,
            timestamp_ms: NOW,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fix_and_snapshot_each_publish_an_update() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle
            .push_snapshot(json!({"bus": {"lat": -6.2188, "lng": 106.8356, "timestamp": NOW}}))
            .await
            .unwrap();
        handle.push_fix(fix(-6.2188, 106.8356)).await.unwrap();
        handle.shutdown().await.unwrap();

        let summary = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;

        assert_eq!(summary.end_reason, LoopEnd::Shutdown);
        assert_eq!(summary.events_applied, 2);
        assert_eq!(summary.updates_published, 3);
        assert_eq!(rec.updates.len(), 3);

        let initial = rec.updates.first().unwrap();
        assert_eq!(initial.result.active_count, 0);

        let after_snapshot = rec.updates.get(1).unwrap();
        assert_eq!(after_snapshot.result.nearby_count, 1);
        assert!(after_snapshot.result.nearest.is_none());

        let after_fix = rec.updates.get(2).unwrap();
        let nearest = after_fix.result.nearest.as_ref().unwrap();
        assert!(nearest.distance_km < 1e-9);
        assert_eq!(after_fix.evaluated_at_ms, NOW);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_events_surface_errors_without_update() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle.push_fix(fix(f64::NAN, 0.0)).await.unwrap();
        handle.push_snapshot(json!([1, 2])).await.unwrap();
        handle
            .push_fix_failure(LocationFailure::PermissionDenied)
            .await
            .unwrap();
        handle.push_feed_failure("offline".to_owned()).await.unwrap();
        drop(handle);

        let summary = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;

        assert_eq!(summary.end_reason, LoopEnd::ProducersGone);
        assert_eq!(summary.events_applied, 4);
        assert_eq!(rec.errors.len(), 4);
        assert!(matches!(rec.errors.first(), Some(TrackerError::InvalidFix { .. })));
        assert_eq!(
            rec.errors.get(2),
            Some(&TrackerError::LocationUnavailable(
                LocationFailure::PermissionDenied
            ))
        );
        // Initial publish plus the two source failures.
        assert_eq!(rec.updates.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_mode_publishes_immediately_then_every_poll() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle.set_driver_mode(true).await.unwrap();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25_000)).await;
            let _ = stopper.shutdown().await;
        });
        drop(handle);

        let _ = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;

        // Immediately on enable, then at 10 s and 20 s.
        assert_eq!(rec.self_reports.len(), 3);
        assert!(rec.self_reports.iter().all(|r| r.peer_id.as_str() == "user_me"));
        assert!(rec.updates.last().unwrap().status.driver_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn no_self_reports_outside_driver_mode() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(4);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35_000)).await;
            let _ = handle.shutdown().await;
        });

        let _ = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;
        assert!(rec.self_reports.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_reports_stale_peers_and_republishes() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle
            .send(TrackerEvent::Reports(vec![
                PeerReport::new(PeerId::from("fresh"), Coordinate::new(-6.2, 106.8), NOW),
                PeerReport::new(
                    PeerId::from("old"),
                    Coordinate::new(-6.2, 106.8),
                    NOW - 301_000,
                ),
            ]))
            .await
            .unwrap();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            let _ = stopper.shutdown().await;
        });
        drop(handle);

        let summary = run_tracker(&mut t, rx, timing(10_000, 1_000), &clock, &mut rec).await;

        assert_eq!(rec.stale, vec![vec![PeerId::from("old")]]);
        // Initial, after snapshot, after cleanup tick.
        assert_eq!(summary.updates_published, 3);
        assert_eq!(rec.updates.last().unwrap().result.active_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_mode_off_retracts_self_record_once() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle.set_driver_mode(false).await.unwrap();
        handle.set_driver_mode(true).await.unwrap();
        handle.set_driver_mode(false).await.unwrap();
        handle.set_driver_mode(false).await.unwrap();
        handle.shutdown().await.unwrap();

        let summary = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;

        // Only the real on -> off transition retracts.
        assert_eq!(rec.retracted, vec![PeerId::from("user_me")]);
        assert_eq!(rec.self_reports.len(), 1);
        // Initial, on, off.
        assert_eq!(summary.updates_published, 3);
        assert!(!rec.updates.last().unwrap().status.driver_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_reports_ids_and_resets_counts() {
        let mut t = tracker();
        let clock = ManualClock::new(NOW);
        let mut rec = Recorder::default();
        let (handle, rx) = channel(16);

        handle
            .send(TrackerEvent::Reports(vec![
                PeerReport::new(PeerId::from("bus"), Coordinate::new(-6.2088, 106.8456), NOW),
                PeerReport::new(
                    PeerId::from("old"),
                    Coordinate::new(-6.2088, 106.8456),
                    NOW - 301_000,
                ),
            ]))
            .await
            .unwrap();
        handle.clear_all().await.unwrap();
        handle.clear_all().await.unwrap();
        handle.shutdown().await.unwrap();

        let summary = run_tracker(&mut t, rx, timing(10_000, 60_000), &clock, &mut rec).await;

        assert_eq!(
            rec.cleared,
            vec![vec![PeerId::from("bus"), PeerId::from("old")]]
        );
        // The second wipe finds nothing and publishes nothing.
        assert_eq!(summary.events_applied, 3);
        assert_eq!(summary.updates_published, 3);
        let last = rec.updates.last().unwrap();
        assert_eq!(last.result.active_count, 0);
        assert_eq!(last.result.nearby_count, 0);
        assert_eq!(last.status.stored_peers, 0);
    }

    #[tokio::test]
    async fn handle_reports_closed_loop() {
        let (handle, rx) = channel(1);
        drop(rx);
        assert_eq!(
            handle.set_driver_mode(true).await,
            Err(TrackerError::ChannelClosed)
        );
    }

    #[test]
    fn timing_from_config() {
        let config = TrackingConfig::default();
        let timing = LoopTiming::from_config(&config);
        assert_eq!(timing.poll_interval, Duration::from_millis(10_000));
        assert_eq!(timing.cleanup_interval, Duration::from_millis(60_000));
    }

    #[test]
    fn no_op_callback_accepts_everything() {
        let mut cb = NoOpCallback;
        cb.on_stale_peers(&[PeerId::from("a")]);
        cb.on_self_retracted(&PeerId::from("me"));
        cb.on_cleared(&[PeerId::from("a")]);
        cb.on_error(&TrackerError::ChannelClosed);
    }
}
