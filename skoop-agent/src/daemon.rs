//! Periodic refresh of the topology cache
//!
//! Each tick spawns one collection cycle and races it against a deadline
//! equal to the refresh interval. The deadline is advisory: when it passes
//! the cycle's token is cancelled and the daemon moves on, but the cycle task
//! keeps running until it next observes the token or finishes on its own.

use crate::error::{Error, Result};
use crate::stats::CycleStats;
use crate::store::EntityStore;
use crate::topology::Collector;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Run one cycle in its own task and wait for it at most `deadline`.
///
/// Returns the number of published entities. A cycle that misses the
/// deadline is left running and reported as [`Error::CycleTimeout`].
pub async fn collect_with_timeout(
    collector: &Arc<Collector>,
    stats: &CycleStats,
    deadline: Duration,
) -> Result<usize> {
    let start = Instant::now();
    let token = CancellationToken::new();
    let _expire = token.clone().drop_guard();

    let cycle = Arc::clone(collector);
    let task = tokio::spawn(async move { cycle.run_cycle(&token).await });

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => {
            info!("cache process finished, latency: {:?}", start.elapsed());
            result
        }
        Ok(Err(join_err)) => Err(Error::CycleAborted(join_err.to_string())),
        Err(_) => {
            warn!("cache process time exceeded, latency: {:?}", start.elapsed());
            stats.record_timeout();
            Err(Error::CycleTimeout)
        }
    }
}

/// Background loop driving refresh cycles until stopped
pub struct RefreshDaemon {
    collector: Arc<Collector>,
    store: EntityStore,
    stats: Arc<CycleStats>,
    interval: Duration,
}

impl RefreshDaemon {
    pub fn new(
        collector: Arc<Collector>,
        store: EntityStore,
        stats: Arc<CycleStats>,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            store,
            stats,
            interval,
        }
    }

    /// Spawn the loop; cancelling `stop` ends it without waiting on an
    /// in-flight cycle
    pub fn spawn(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn run(self, stop: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "refresh daemon started, source: {}, interval: {:?}",
            self.collector.source_name(),
            self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Dropping the wait cancels the cycle token; the detached task is not joined
            let collect = collect_with_timeout(&self.collector, &self.stats, self.interval);
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                result = collect => {
                    if let Err(e) = result {
                        error!("failed cache pods: {}", e);
                    }
                }
            }

            let purged = self.store.purge_expired();
            if purged > 0 {
                debug!("purged {} expired index entries", purged);
            }
        }

        info!("refresh daemon stopped");
    }
}
