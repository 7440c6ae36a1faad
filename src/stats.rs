//! Runtime counters for the hub.
//!
//! Failures in the pipeline are contained to the reading or subscriber
//! involved; these counters are where they become visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by the pipeline and the event hub.
#[derive(Debug)]
pub struct HubStats {
    /// Readings that passed validation
    readings_accepted: AtomicU64,
    /// Readings dropped as invalid
    readings_rejected: AtomicU64,
    /// State transitions published
    transitions: AtomicU64,
    /// Individual event deliveries to subscribers
    events_delivered: AtomicU64,
    /// Subscribers that ever connected
    subscribers_joined: AtomicU64,
    /// Subscribers evicted after a failed write
    subscribers_evicted: AtomicU64,
    started_at: DateTime<Utc>,
}

impl HubStats {
    pub fn new() -> Self {
        Self {
            readings_accepted: AtomicU64::new(0),
            readings_rejected: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            subscribers_joined: AtomicU64::new(0),
            subscribers_evicted: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_reading_accepted(&self) {
        self.readings_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deliveries(&self, count: u64) {
        self.events_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_subscriber_joined(&self) {
        self.subscribers_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_evicted(&self) {
        self.subscribers_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings_accepted: self.readings_accepted.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            subscribers_joined: self.subscribers_joined.load(Ordering::Relaxed),
            subscribers_evicted: self.subscribers_evicted.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Human readable summary, printed on shutdown.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Hub Statistics:\n\
             - Readings accepted: {}\n\
             - Readings rejected: {}\n\
             - Transitions published: {}\n\
             - Deliveries: {}\n\
             - Subscribers joined: {}\n\
             - Subscribers evicted: {}\n\
             - Uptime: {} seconds",
            stats.readings_accepted,
            stats.readings_rejected,
            stats.transitions,
            stats.events_delivered,
            stats.subscribers_joined,
            stats.subscribers_evicted,
            stats.uptime_secs
        )
    }
}

impl Default for HubStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`HubStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub transitions: u64,
    pub events_delivered: u64,
    pub subscribers_joined: u64,
    pub subscribers_evicted: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedHubStats = Arc<HubStats>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = HubStats::new();

        stats.record_reading_accepted();
        stats.record_reading_accepted();
        stats.record_reading_rejected();
        stats.record_deliveries(3);

        let snapshot = stats.stats();
        assert_eq!(snapshot.readings_accepted, 2);
        assert_eq!(snapshot.readings_rejected, 1);
        assert_eq!(snapshot.events_delivered, 3);
    }

    #[test]
    fn test_summary_format() {
        let summary = HubStats::new().summary();
        assert!(summary.contains("Readings accepted"));
        assert!(summary.contains("Subscribers evicted"));
    }
}
