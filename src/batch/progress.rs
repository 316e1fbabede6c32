//! In-flight batch progress snapshot.
//!
//! The snapshot is a short-TTL progress cache for external polling, not
//! durable queue state: it expires on its own and a stop request clears it
//! outright. The queue remains the source of truth.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Where the current (or last) batch run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Idle,
    Running,
    Completed,
}

/// Snapshot of the in-flight batch run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingSnapshot {
    pub status: ProcessingStatus,
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingSnapshot {
    fn idle() -> Self {
        Self {
            status: ProcessingStatus::Idle,
            current: 0,
            total: 0,
            percentage: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Shared, expiring progress cell updated by the batch runner.
pub struct ProgressTracker {
    ttl: Duration,
    cell: Mutex<Option<(ProcessingSnapshot, Instant)>>,
}

impl ProgressTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cell: Mutex::new(None),
        }
    }

    /// Record progress after an item.
    pub fn update(&self, status: ProcessingStatus, current: usize, total: usize) {
        let percentage = if total == 0 {
            100.0
        } else {
            (current as f64 / total as f64) * 100.0
        };
        let snapshot = ProcessingSnapshot {
            status,
            current,
            total,
            percentage,
            timestamp: Utc::now(),
        };
        *self.cell.lock() = Some((snapshot, Instant::now()));
    }

    /// Drop the snapshot (a stop request, or a fresh deployment).
    pub fn clear(&self) {
        *self.cell.lock() = None;
    }

    /// Current snapshot; an expired or absent one reads as Idle.
    pub fn get(&self) -> ProcessingSnapshot {
        let cell = self.cell.lock();
        match cell.as_ref() {
            Some((snapshot, at)) if at.elapsed() < self.ttl => snapshot.clone(),
            _ => ProcessingSnapshot::idle(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        // Long enough to poll at a leisurely interval, short enough that a
        // dead worker doesn't look busy forever.
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let tracker = ProgressTracker::default();
        assert_eq!(tracker.get().status, ProcessingStatus::Idle);
    }

    #[test]
    fn test_update_and_percentage() {
        let tracker = ProgressTracker::default();
        tracker.update(ProcessingStatus::Running, 1, 4);

        let snapshot = tracker.get();
        assert_eq!(snapshot.status, ProcessingStatus::Running);
        assert_eq!(snapshot.current, 1);
        assert_eq!(snapshot.total, 4);
        assert!((snapshot.percentage - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_returns_to_idle() {
        let tracker = ProgressTracker::default();
        tracker.update(ProcessingStatus::Running, 1, 2);
        tracker.clear();
        assert_eq!(tracker.get().status, ProcessingStatus::Idle);
    }

    #[test]
    fn test_expiry() {
        let tracker = ProgressTracker::new(Duration::from_millis(0));
        tracker.update(ProcessingStatus::Completed, 2, 2);
        assert_eq!(tracker.get().status, ProcessingStatus::Idle);
    }

    #[test]
    fn test_zero_total_is_complete() {
        let tracker = ProgressTracker::default();
        tracker.update(ProcessingStatus::Completed, 0, 0);
        assert!((tracker.get().percentage - 100.0).abs() < f64::EPSILON);
    }
}
