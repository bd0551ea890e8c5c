//! Streaming metrics tracking.
//!
//! Provides atomic counters for monitoring the shared connection and the
//! subscription registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics for the streaming client.
#[derive(Debug)]
pub struct StreamMetrics {
    /// Sockets successfully opened.
    connections_opened: AtomicU64,

    /// Sockets closed for any reason.
    connections_closed: AtomicU64,

    /// Reconnect attempts scheduled.
    reconnects: AtomicU64,

    /// Inbound text frames.
    frames_received: AtomicU64,

    /// Snapshots handed to listeners.
    snapshots_delivered: AtomicU64,

    /// Decoded snapshots suppressed by fingerprint.
    duplicates_suppressed: AtomicU64,

    /// Frames that failed to parse or decode.
    malformed_frames: AtomicU64,

    /// Frames no subscription claimed.
    unroutable_frames: AtomicU64,

    /// Subscribe control frames sent.
    subscribe_frames: AtomicU64,

    /// Unsubscribe control frames sent.
    unsubscribe_frames: AtomicU64,

    /// Heartbeats sent.
    heartbeats: AtomicU64,

    /// Sockets closed because no frame arrived in time.
    stale_closes: AtomicU64,

    /// Start time for rate calculation.
    start_time: Instant,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            snapshots_delivered: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            unroutable_frames: AtomicU64::new(0),
            subscribe_frames: AtomicU64::new(0),
            unsubscribe_frames: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            stale_closes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a socket opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a socket closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a scheduled reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an inbound frame.
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a snapshot delivered to listeners.
    pub fn record_snapshot_delivered(&self) {
        self.snapshots_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a duplicate snapshot suppressed.
    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a malformed frame.
    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an unroutable frame.
    pub fn record_unroutable(&self) {
        self.unroutable_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a subscribe frame sent.
    pub fn record_subscribe_sent(&self) {
        self.subscribe_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an unsubscribe frame sent.
    pub fn record_unsubscribe_sent(&self) {
        self.unsubscribe_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a heartbeat sent.
    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a socket closed for staleness.
    pub fn record_stale_close(&self) {
        self.stale_closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total sockets opened.
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Returns the total sockets closed.
    #[must_use]
    pub fn connections_closed(&self) -> u64 {
        self.connections_closed.load(Ordering::Relaxed)
    }

    /// Returns the reconnect attempts scheduled.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Returns the total frames received.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Returns the total snapshots delivered.
    #[must_use]
    pub fn snapshots_delivered(&self) -> u64 {
        self.snapshots_delivered.load(Ordering::Relaxed)
    }

    /// Returns the total duplicates suppressed.
    #[must_use]
    pub fn duplicates_suppressed(&self) -> u64 {
        self.duplicates_suppressed.load(Ordering::Relaxed)
    }

    /// Returns the total malformed frames.
    #[must_use]
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Returns the total unroutable frames.
    #[must_use]
    pub fn unroutable_frames(&self) -> u64 {
        self.unroutable_frames.load(Ordering::Relaxed)
    }

    /// Returns the total subscribe frames sent.
    #[must_use]
    pub fn subscribe_frames(&self) -> u64 {
        self.subscribe_frames.load(Ordering::Relaxed)
    }

    /// Returns the total unsubscribe frames sent.
    #[must_use]
    pub fn unsubscribe_frames(&self) -> u64 {
        self.unsubscribe_frames.load(Ordering::Relaxed)
    }

    /// Returns the total heartbeats sent.
    #[must_use]
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    /// Returns the total stale closes.
    #[must_use]
    pub fn stale_closes(&self) -> u64 {
        self.stale_closes.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns inbound frames per second.
    #[must_use]
    pub fn frames_per_second(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed > 0.0 {
            self.frames_received() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            connections_opened: self.connections_opened(),
            connections_closed: self.connections_closed(),
            reconnects: self.reconnects(),
            frames_received: self.frames_received(),
            snapshots_delivered: self.snapshots_delivered(),
            duplicates_suppressed: self.duplicates_suppressed(),
            malformed_frames: self.malformed_frames(),
            unroutable_frames: self.unroutable_frames(),
            subscribe_frames: self.subscribe_frames(),
            unsubscribe_frames: self.unsubscribe_frames(),
            heartbeats: self.heartbeats(),
            stale_closes: self.stale_closes(),
            uptime: self.uptime(),
            frames_per_second: self.frames_per_second(),
        }
    }
}

/// A point-in-time snapshot of streaming metrics.
#[derive(Debug, Clone)]
pub struct StreamMetricsSnapshot {
    /// Sockets opened.
    pub connections_opened: u64,
    /// Sockets closed.
    pub connections_closed: u64,
    /// Reconnects scheduled.
    pub reconnects: u64,
    /// Frames received.
    pub frames_received: u64,
    /// Snapshots delivered.
    pub snapshots_delivered: u64,
    /// Duplicates suppressed.
    pub duplicates_suppressed: u64,
    /// Malformed frames.
    pub malformed_frames: u64,
    /// Unroutable frames.
    pub unroutable_frames: u64,
    /// Subscribe frames sent.
    pub subscribe_frames: u64,
    /// Unsubscribe frames sent.
    pub unsubscribe_frames: u64,
    /// Heartbeats sent.
    pub heartbeats: u64,
    /// Stale closes.
    pub stale_closes: u64,
    /// Uptime.
    pub uptime: Duration,
    /// Frames per second.
    pub frames_per_second: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = StreamMetrics::new();
        assert_eq!(metrics.connections_opened(), 0);
        assert_eq!(metrics.frames_received(), 0);
        assert_eq!(metrics.duplicates_suppressed(), 0);
    }

    #[test]
    fn test_metrics_record_connection() {
        let metrics = StreamMetrics::default();

        metrics.record_connection_opened();
        metrics.record_connection_closed();
        metrics.record_reconnect();
        metrics.record_connection_opened();

        assert_eq!(metrics.connections_opened(), 2);
        assert_eq!(metrics.connections_closed(), 1);
        assert_eq!(metrics.reconnects(), 1);
    }

    #[test]
    fn test_metrics_record_frames() {
        let metrics = StreamMetrics::new();

        metrics.record_frame_received();
        metrics.record_frame_received();
        metrics.record_snapshot_delivered();
        metrics.record_duplicate();
        metrics.record_malformed();
        metrics.record_unroutable();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.snapshots_delivered, 1);
        assert_eq!(snapshot.duplicates_suppressed, 1);
        assert_eq!(snapshot.malformed_frames, 1);
        assert_eq!(snapshot.unroutable_frames, 1);
    }

    #[test]
    fn test_metrics_record_control_frames() {
        let metrics = StreamMetrics::new();

        metrics.record_subscribe_sent();
        metrics.record_subscribe_sent();
        metrics.record_unsubscribe_sent();
        metrics.record_heartbeat();
        metrics.record_stale_close();

        assert_eq!(metrics.subscribe_frames(), 2);
        assert_eq!(metrics.unsubscribe_frames(), 1);
        assert_eq!(metrics.heartbeats(), 1);
        assert_eq!(metrics.stale_closes(), 1);
    }
}
