//! Composition of the cache from configuration
//!
//! The topology source is picked once: a reachable container runtime wins,
//! otherwise the node's pods are followed through the API server.

use crate::config::Config;
use crate::k8s::{K8sClient, NodePods, NodeWorkloads, PodWatcher};
use crate::Result;
use skoop_agent::crictl::CrictlClient;
use skoop_agent::{
    HostIntrospect, IdentitySource, LinuxHost, Mode, RuntimeTopology, TopologyCache,
    WatchTopology,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A started cache plus the background tasks it depends on
pub struct Agent {
    pub cache: TopologyCache,
    watcher_stop: CancellationToken,
}

impl Agent {
    pub async fn start(config: &Config) -> Result<Self> {
        let linux = LinuxHost::with_roots(config.proc_root.clone(), config.cgroup_root.clone());
        let cgroups = linux.cgroups().clone();
        let host: Arc<dyn HostIntrospect> = Arc::new(linux);
        let watcher_stop = CancellationToken::new();

        let mode = if config.sidecar {
            info!("Running in sidecar mode");
            Mode::Sidecar(IdentitySource::from_env())
        } else {
            match CrictlClient::connect(&config.crictl_path, &config.runtime_endpoints).await {
                Ok(client) => {
                    info!("Using container runtime at {}", client.endpoint());
                    Mode::NodeAgent(Box::new(RuntimeTopology::new(
                        Arc::new(client),
                        Arc::clone(&host),
                    )))
                }
                Err(e) => {
                    warn!("{}, falling back to API-server watch", e);
                    let pods = start_pod_watcher(config, watcher_stop.clone()).await?;
                    let workloads = NodeWorkloads::new(pods, cgroups, Arc::clone(&host));
                    Mode::NodeAgent(Box::new(WatchTopology::new(
                        Arc::new(workloads),
                        Arc::clone(&host),
                    )))
                }
            }
        };

        let cache = match TopologyCache::start(config.cache_config(), mode, host).await {
            Ok(cache) => cache,
            Err(e) => {
                watcher_stop.cancel();
                return Err(e.into());
            }
        };

        Ok(Self {
            cache,
            watcher_stop,
        })
    }

    pub async fn stop(&mut self) {
        self.cache.stop().await;
        self.watcher_stop.cancel();
    }
}

async fn start_pod_watcher(config: &Config, stop: CancellationToken) -> Result<NodePods> {
    let node_name = config.resolve_node_name()?;
    let client = K8sClient::try_default().await?;

    let pods = NodePods::new();
    let watcher = PodWatcher::new(client.pods_all(), node_name, pods.clone());
    watcher.resync().await?;
    tokio::spawn(watcher.run(stop));

    Ok(pods)
}
