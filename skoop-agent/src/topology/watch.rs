use super::{CycleBuilder, TopologySource};
use crate::entity::{Entity, NetnsIdentity, WorkloadIdentity};
use crate::error::Result;
use crate::introspect::HostIntrospect;
use crate::watch::WorkloadWatch;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collects entities from an API-server pod watch, used when no runtime
/// client could be initialized
pub struct WatchTopology {
    watch: Arc<dyn WorkloadWatch>,
    host: Arc<dyn HostIntrospect>,
}

impl WatchTopology {
    pub fn new(watch: Arc<dyn WorkloadWatch>, host: Arc<dyn HostIntrospect>) -> Self {
        Self { watch, host }
    }
}

#[async_trait]
impl TopologySource for WatchTopology {
    fn name(&self) -> &'static str {
        "apiserver"
    }

    // The watch view is local memory, so the cycle never blocks long
    // enough to need cancellation checks.
    async fn collect(&self, cycle: &mut CycleBuilder, _cancel: &CancellationToken) -> Result<()> {
        for pod in self.watch.list_local_workloads() {
            if pod.name.is_empty() || pod.namespace.is_empty() {
                debug!("skip workload without name or namespace: {:?}", pod.cgroup_path);
                continue;
            }

            let pids = self.host.pids_under_cgroup(&pod.cgroup_path, true);
            if pids.is_empty() {
                warn!(
                    "sandbox {}/{}: found 0 pids under cgroup {}",
                    pod.namespace, pod.name, pod.cgroup_path
                );
            }

            let netns = Arc::new(NetnsIdentity {
                inum: pod.netns_inode,
                mount_path: pod.netns_path,
                is_host_network: pod.is_host_network,
                ip_list: pod.ip.into_iter().collect(),
            });

            cycle.add(
                Entity::new(netns, WorkloadIdentity::new(pod.name, pod.namespace))
                    .with_init_pid(pod.sandbox_pid)
                    .with_pids(pids)
                    .with_labels(pod.labels),
            );
        }

        Ok(())
    }
}
