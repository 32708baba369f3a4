use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated on the submit and execute paths.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) faulted: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of job queue activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs accepted into a slot.
    pub enqueued: u64,
    /// Submissions refused because no slot was free.
    pub rejected: u64,
    /// Job bodies that returned normally.
    pub executed: u64,
    /// Job bodies that panicked.
    pub faulted: u64,
    /// Slots not currently `Available`.
    pub in_flight: usize,
    pub capacity: usize,
    pub workers: usize,
}

impl QueueStats {
    /// Share of slots in use (0.0 - 1.0).
    pub fn occupancy(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.in_flight as f64 / self.capacity as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_ratio() {
        let stats = QueueStats {
            in_flight: 16,
            capacity: 64,
            ..QueueStats::default()
        };
        assert_eq!(stats.occupancy(), 0.25);
        assert_eq!(QueueStats::default().occupancy(), 0.0);
    }
}
