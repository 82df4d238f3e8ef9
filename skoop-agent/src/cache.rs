//! Query surface and lifecycle of the workload identity cache

use crate::bootstrap::{build_anchor, IdentitySource};
use crate::config::CacheConfig;
use crate::daemon::{collect_with_timeout, RefreshDaemon};
use crate::entity::Entity;
use crate::error::Result;
use crate::introspect::HostIntrospect;
use crate::snapshot::{EntityList, SnapshotPublisher};
use crate::stats::{CycleStats, CycleStatsSnapshot};
use crate::store::{EntityStore, IndexSizes, Lifetime, NamespaceIndexing};
use crate::topology::{Collector, TopologySource};
use log::{error, info};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How the agent is deployed
pub enum Mode {
    /// One agent per node on the host network namespace, refreshing from
    /// the given source
    NodeAgent(Box<dyn TopologySource>),
    /// Injected into a single pod; only that pod is ever cached
    Sidecar(IdentitySource),
}

/// Read-only handle for lookup callers, cheap to clone
#[derive(Clone)]
pub struct TopologyView {
    store: EntityStore,
    publisher: SnapshotPublisher,
}

impl TopologyView {
    pub fn lookup_by_namespace(&self, inum: u64) -> Option<Arc<Entity>> {
        self.store.lookup_by_namespace(inum)
    }

    pub fn lookup_by_ip(&self, ip: IpAddr) -> Option<Arc<Entity>> {
        self.store.lookup_by_ip(ip)
    }

    pub fn lookup_by_pid(&self, pid: u32) -> Option<Arc<Entity>> {
        self.store.lookup_by_pid(pid)
    }

    pub fn current_snapshot(&self) -> EntityList {
        self.publisher.current()
    }
}

/// The running cache: store, snapshot and the refresh daemon driving them
pub struct TopologyCache {
    view: TopologyView,
    anchor: Arc<Entity>,
    stats: Arc<CycleStats>,
    stop: CancellationToken,
    daemon: Option<JoinHandle<()>>,
}

impl TopologyCache {
    /// Bootstrap the anchor and, in node-agent mode, run the first cycle and
    /// start the refresh daemon.
    ///
    /// Fails when the anchor cannot be built or the first cycle fails.
    pub async fn start(
        config: CacheConfig,
        mode: Mode,
        host: Arc<dyn HostIntrospect>,
    ) -> Result<Self> {
        let store = EntityStore::new(config.entry_ttl());
        let publisher = SnapshotPublisher::new();
        let stats = Arc::new(CycleStats::new());
        let stop = CancellationToken::new();

        let sidecar = match &mode {
            Mode::Sidecar(source) => Some(source),
            Mode::NodeAgent(_) => None,
        };
        let anchor = Arc::new(build_anchor(host.as_ref(), sidecar)?);
        store.put(&anchor, NamespaceIndexing::Always, Lifetime::Pinned);

        let view = TopologyView {
            store: store.clone(),
            publisher: publisher.clone(),
        };

        let daemon = match mode {
            Mode::Sidecar(_) => {
                publisher.publish(vec![Arc::clone(&anchor)]);
                info!("sidecar mode, caching only {}", anchor);
                None
            }
            Mode::NodeAgent(source) => {
                let collector = Arc::new(Collector::new(
                    source,
                    store.clone(),
                    publisher,
                    Arc::clone(&anchor),
                    Arc::clone(&stats),
                ));

                collect_with_timeout(&collector, &stats, config.refresh_interval).await?;

                let daemon = RefreshDaemon::new(
                    collector,
                    store,
                    Arc::clone(&stats),
                    config.refresh_interval,
                );
                Some(daemon.spawn(stop.clone()))
            }
        };

        Ok(Self {
            view,
            anchor,
            stats,
            stop,
            daemon,
        })
    }

    /// Stop the refresh daemon and wait for its loop to exit.
    ///
    /// An in-flight cycle is not awaited; lookups keep working afterwards.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.daemon.take() {
            if let Err(e) = handle.await {
                error!("refresh daemon exited abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    pub fn lookup_by_namespace(&self, inum: u64) -> Option<Arc<Entity>> {
        self.view.lookup_by_namespace(inum)
    }

    pub fn lookup_by_ip(&self, ip: IpAddr) -> Option<Arc<Entity>> {
        self.view.lookup_by_ip(ip)
    }

    pub fn lookup_by_pid(&self, pid: u32) -> Option<Arc<Entity>> {
        self.view.lookup_by_pid(pid)
    }

    /// Entity list published by the last completed cycle, anchor first
    pub fn current_snapshot(&self) -> EntityList {
        self.view.current_snapshot()
    }

    pub fn anchor(&self) -> &Arc<Entity> {
        &self.anchor
    }

    pub fn stats(&self) -> CycleStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn index_sizes(&self) -> IndexSizes {
        self.view.store.index_sizes()
    }

    pub fn view(&self) -> TopologyView {
        self.view.clone()
    }
}

impl Drop for TopologyCache {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
