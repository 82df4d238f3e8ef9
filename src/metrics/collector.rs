use crate::{Result, SkoopError};
use prometheus::{Gauge, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use skoop_agent::{CycleStatsSnapshot, IndexSizes};
use std::sync::Mutex;

/// Prometheus view of the cache's cycle counters and index sizes
pub struct CacheMetrics {
    registry: Registry,
    cycles_total: IntCounterVec,
    cycle_duration_seconds: Gauge,
    entities: IntGauge,
    index_entries: IntGaugeVec,
    last: Mutex<CycleStatsSnapshot>,
}

impl CacheMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("skoop_cache_cycles_total", "Refresh cycles by outcome"),
            &["result"],
        )
        .map_err(metrics_error)?;
        let cycle_duration_seconds = Gauge::with_opts(Opts::new(
            "skoop_cache_cycle_duration_seconds",
            "Duration of the last completed refresh cycle",
        ))
        .map_err(metrics_error)?;
        let entities = IntGauge::new(
            "skoop_cache_entities",
            "Entities published by the last completed refresh cycle",
        )
        .map_err(metrics_error)?;
        let index_entries = IntGaugeVec::new(
            Opts::new("skoop_cache_index_entries", "Keys held by each lookup index"),
            &["index"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(cycles_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(cycle_duration_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(entities.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(index_entries.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            cycles_total,
            cycle_duration_seconds,
            entities,
            index_entries,
            last: Mutex::new(CycleStatsSnapshot::default()),
        })
    }

    /// Fold the latest counters into the registry
    pub fn observe(&self, stats: CycleStatsSnapshot, sizes: IndexSizes) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        self.cycles_total
            .with_label_values(&["completed"])
            .inc_by(stats.completed.saturating_sub(last.completed));
        self.cycles_total
            .with_label_values(&["failed"])
            .inc_by(stats.failed.saturating_sub(last.failed));
        self.cycles_total
            .with_label_values(&["timeout"])
            .inc_by(stats.timed_out.saturating_sub(last.timed_out));
        *last = stats;

        self.cycle_duration_seconds
            .set(stats.last_duration.as_secs_f64());
        self.entities.set(stats.last_entity_count as i64);

        self.index_entries
            .with_label_values(&["netns"])
            .set(sizes.netns as i64);
        self.index_entries
            .with_label_values(&["ip"])
            .set(sizes.ip as i64);
        self.index_entries
            .with_label_values(&["pid"])
            .set(sizes.pid as i64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn metrics_error(e: prometheus::Error) -> SkoopError {
    SkoopError::MetricsError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats(completed: u64, failed: u64, timed_out: u64) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            completed,
            failed,
            timed_out,
            last_duration: Duration::from_millis(1500),
            last_entity_count: 12,
        }
    }

    #[test]
    fn test_observe_accumulates_deltas() {
        let metrics = CacheMetrics::new().unwrap();
        let sizes = IndexSizes {
            netns: 10,
            ip: 11,
            pid: 40,
        };

        metrics.observe(stats(3, 1, 0), sizes);
        metrics.observe(stats(5, 1, 2), sizes);

        assert_eq!(
            metrics.cycles_total.with_label_values(&["completed"]).get(),
            5
        );
        assert_eq!(metrics.cycles_total.with_label_values(&["failed"]).get(), 1);
        assert_eq!(metrics.cycles_total.with_label_values(&["timeout"]).get(), 2);
        assert_eq!(metrics.entities.get(), 12);
        assert_eq!(metrics.index_entries.with_label_values(&["pid"]).get(), 40);
        assert!((metrics.cycle_duration_seconds.get() - 1.5).abs() < f64::EPSILON);
    }
}
