//! Refresh cycle counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome counters shared by the collector and the daemon
#[derive(Debug, Default)]
pub struct CycleStats {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    last_duration_micros: AtomicU64,
    last_entity_count: AtomicU64,
}

/// Point-in-time copy of [`CycleStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub last_duration: Duration,
    pub last_entity_count: u64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, elapsed: Duration, entities: usize) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.last_duration_micros
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.last_entity_count
            .store(entities as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            last_duration: Duration::from_micros(
                self.last_duration_micros.load(Ordering::Relaxed),
            ),
            last_entity_count: self.last_entity_count.load(Ordering::Relaxed),
        }
    }
}
