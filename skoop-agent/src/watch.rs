//! API-server watch contract used when no container runtime is reachable

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// A pod running on this node, as reported by the watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalWorkload {
    pub name: String,
    pub namespace: String,
    pub netns_inode: u64,
    pub netns_path: PathBuf,
    pub is_host_network: bool,
    pub ip: Option<IpAddr>,
    pub cgroup_path: String,
    pub sandbox_pid: u32,
    pub labels: HashMap<String, String>,
}

/// Source of node-local workloads kept current by a watch
pub trait WorkloadWatch: Send + Sync {
    /// Current view of the pods on this node
    fn list_local_workloads(&self) -> Vec<LocalWorkload>;
}
