use super::{CycleBuilder, TopologySource};
use crate::entity::{Entity, NetnsIdentity, WorkloadIdentity};
use crate::error::{Error, Result};
use crate::introspect::HostIntrospect;
use crate::runtime::{sandbox_info, RuntimeClient, RuntimeKind, SandboxRef};
use async_trait::async_trait;
use log::{error, warn};
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collects entities from the ready sandboxes of a container runtime
pub struct RuntimeTopology {
    client: Arc<dyn RuntimeClient>,
    host: Arc<dyn HostIntrospect>,
    kind: RuntimeKind,
}

impl RuntimeTopology {
    pub fn new(client: Arc<dyn RuntimeClient>, host: Arc<dyn HostIntrospect>) -> Self {
        let kind = RuntimeKind::from_name(&client.info().runtime_name);
        Self { client, host, kind }
    }

    async fn build_entity(&self, sandbox: &SandboxRef, anchor: &Entity) -> Result<Entity> {
        let meta = sandbox.metadata.as_ref().ok_or_else(|| Error::MissingMetadata {
            id: sandbox.id.clone(),
        })?;
        let label = format!("{}/{}", meta.namespace, meta.name);

        let status = self.client.sandbox_status(&sandbox.id, true).await?;
        let info = sandbox_info(&self.kind, &status)?;

        let inum = self
            .host
            .namespace_inode_of(info.pid)
            .map_err(|e| Error::Namespace {
                pid: info.pid,
                reason: format!("{:#}", e),
            })?;

        let mut pids = Vec::new();
        if !info.cgroup_parent.is_empty() {
            pids = self.host.pids_under_cgroup(&info.cgroup_parent, false);
            if pids.is_empty() {
                warn!(
                    "sandbox {}: found 0 pids under cgroup {}",
                    label, info.cgroup_parent
                );
            }
        }

        let netns = if inum == anchor.netns() {
            Arc::clone(anchor.netns_identity())
        } else {
            let ip: IpAddr = status
                .ip
                .as_deref()
                .and_then(|ip| ip.parse().ok())
                .ok_or_else(|| Error::NoNetwork(label.clone()))?;
            Arc::new(NetnsIdentity::for_pid(inum, info.pid, false, vec![ip]))
        };

        Ok(
            Entity::new(netns, WorkloadIdentity::new(&meta.name, &meta.namespace))
                .with_init_pid(info.pid)
                .with_pids(pids)
                .with_labels(sandbox.labels.clone()),
        )
    }
}

#[async_trait]
impl TopologySource for RuntimeTopology {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn collect(&self, cycle: &mut CycleBuilder, cancel: &CancellationToken) -> Result<()> {
        let sandboxes = self.client.list_ready_sandboxes().await?;

        for sandbox in &sandboxes {
            if cancel.is_cancelled() {
                return Err(Error::CycleTimeout);
            }

            let anchor = Arc::clone(cycle.anchor());
            match self.build_entity(sandbox, &anchor).await {
                Ok(entity) => cycle.add(entity),
                Err(e) => error!("skip sandbox {}: {}", sandbox.id, e),
            }
        }

        Ok(())
    }
}
