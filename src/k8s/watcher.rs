//! Node-scoped pod watcher backing the API-server topology source
//!
//! Used when no container runtime answers. Keeps the pods scheduled on this
//! node in memory and maps them onto local cgroups and network namespaces
//! on demand.

use crate::k8s::client::node_field_selector;
use crate::k8s::types::PodInfo;
use crate::{Result, SkoopError};
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::runtime::watcher::{self, Event};
use skoop_agent::cgroup::{CgroupResolver, QosClass};
use skoop_agent::entity::netns_mount_path;
use skoop_agent::{HostIntrospect, LocalWorkload, WorkloadWatch};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pods on this node, keyed by UID
#[derive(Clone, Default)]
pub struct NodePods {
    inner: Arc<DashMap<String, PodInfo>>,
}

impl NodePods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, pod: &Pod) {
        let info = PodInfo::from_k8s_pod(pod);
        if info.uid.is_empty() {
            return;
        }
        debug!("Tracking pod {}/{} ({})", info.namespace, info.name, info.phase);
        self.inner.insert(info.uid.clone(), info);
    }

    pub fn remove(&self, pod: &Pod) {
        if let Some(uid) = pod.metadata.uid.as_deref() {
            self.inner.remove(uid);
        }
    }

    pub fn replace_all(&self, pods: &[Pod]) {
        self.inner.clear();
        for pod in pods {
            self.apply(pod);
        }
    }

    pub fn snapshot(&self) -> Vec<PodInfo> {
        self.inner.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Watches the pods scheduled on one node and keeps [`NodePods`] current
pub struct PodWatcher {
    api: Api<Pod>,
    node_name: String,
    pods: NodePods,
}

impl PodWatcher {
    pub fn new(api: Api<Pod>, node_name: impl Into<String>, pods: NodePods) -> Self {
        Self {
            api,
            node_name: node_name.into(),
            pods,
        }
    }

    /// Run until `stop` is cancelled, reconnecting with exponential backoff
    pub async fn run(self, stop: CancellationToken) {
        info!("Starting pod watcher for node {}", self.node_name);

        let mut backoff = INITIAL_BACKOFF;

        loop {
            let result = tokio::select! {
                _ = stop.cancelled() => {
                    info!("Pod watcher stopped");
                    return;
                }
                result = self.watch_pods() => result,
            };

            match result {
                Ok(()) => {
                    warn!("Pod watch stream ended, reconnecting...");
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    error!("Pod watch failed: {}, reconnecting in {:?}", e, backoff);
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
                }
            }
        }
    }

    /// List the node's pods once, so the first refresh cycle has data
    pub async fn resync(&self) -> Result<()> {
        let params = ListParams::default().fields(&node_field_selector(&self.node_name));
        let list = self.api.list(&params).await.map_err(|e| {
            SkoopError::KubernetesError(format!("Failed to list pods: {}", e))
        })?;

        self.pods.replace_all(&list.items);
        info!("Resync complete. Tracking {} pods", self.pods.len());
        Ok(())
    }

    async fn watch_pods(&self) -> Result<()> {
        let config = watcher::Config::default().fields(&node_field_selector(&self.node_name));
        let mut stream = watcher::watcher(self.api.clone(), config).boxed();

        let mut initial = Vec::new();
        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| SkoopError::KubernetesError(e.to_string()))?
        {
            match event {
                Event::Apply(pod) => self.pods.apply(&pod),
                Event::Delete(pod) => self.pods.remove(&pod),
                Event::Init => {
                    debug!("Pod watcher initialized");
                    initial.clear();
                }
                Event::InitApply(pod) => initial.push(pod),
                Event::InitDone => {
                    self.pods.replace_all(&initial);
                    initial.clear();
                    info!(
                        "Pod watcher initial sync complete. Tracking {} pods",
                        self.pods.len()
                    );
                }
            }
        }

        Ok(())
    }
}

/// [`WorkloadWatch`] over the watched pods of this node
pub struct NodeWorkloads {
    pods: NodePods,
    cgroups: CgroupResolver,
    host: Arc<dyn HostIntrospect>,
}

impl NodeWorkloads {
    pub fn new(pods: NodePods, cgroups: CgroupResolver, host: Arc<dyn HostIntrospect>) -> Self {
        Self {
            pods,
            cgroups,
            host,
        }
    }

    fn resolve(&self, pod: PodInfo) -> Option<LocalWorkload> {
        let qos = pod.qos_class.as_deref().and_then(QosClass::parse)?;
        let cgroup_path = self.cgroups.locate_pod(&pod.uid, qos)?;

        let sandbox_pid = *self.host.pids_under_cgroup(&cgroup_path, false).first()?;
        let netns_inode = match self.host.namespace_inode_of(sandbox_pid) {
            Ok(inode) => inode,
            Err(e) => {
                debug!("Pod {}/{}: {:#}", pod.namespace, pod.name, e);
                return None;
            }
        };

        Some(LocalWorkload {
            netns_inode,
            netns_path: netns_mount_path(sandbox_pid),
            is_host_network: pod.host_network,
            ip: pod.pod_ip.as_deref().and_then(|ip| ip.parse().ok()),
            cgroup_path,
            sandbox_pid,
            labels: pod.labels.into_iter().collect(),
            name: pod.name,
            namespace: pod.namespace,
        })
    }
}

impl WorkloadWatch for NodeWorkloads {
    fn list_local_workloads(&self) -> Vec<LocalWorkload> {
        self.pods
            .snapshot()
            .into_iter()
            .filter(PodInfo::is_running)
            .filter_map(|pod| {
                let label = format!("{}/{}", pod.namespace, pod.name);
                let workload = self.resolve(pod);
                if workload.is_none() {
                    debug!("Pod {} has no resolvable sandbox process, skipping", label);
                }
                workload
            })
            .collect()
    }
}
