//! Entity model binding a network namespace to its processes and owning pod
//!
//! An [`Entity`] is what kernel-event probes resolve a netns inode, an IP or
//! a PID to. Workloads sharing a namespace share one [`NetnsIdentity`] by
//! reference, which is how host-network pods collapse onto the anchor.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Path of the namespace handle for a process, as seen by the agent
pub fn netns_mount_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("/proc/{}/ns/net", pid))
}

/// Identity of one network namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetnsIdentity {
    /// Kernel-assigned inode number, the de-duplication key
    pub inum: u64,
    pub mount_path: PathBuf,
    pub is_host_network: bool,
    /// Global-unicast addresses visible in the namespace
    pub ip_list: Vec<IpAddr>,
}

impl NetnsIdentity {
    /// Build an identity whose mount path is the namespace handle of `pid`
    pub fn for_pid(inum: u64, pid: u32, is_host_network: bool, ip_list: Vec<IpAddr>) -> Self {
        Self {
            inum,
            mount_path: netns_mount_path(pid),
            is_host_network,
            ip_list,
        }
    }
}

/// Identity of the pod owning a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WorkloadIdentity {
    pub name: String,
    pub namespace: String,
}

impl WorkloadIdentity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// True when the workload could not be attributed
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.namespace.is_empty()
    }
}

/// A network namespace together with its processes and owning workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    netns: Arc<NetnsIdentity>,
    workload: WorkloadIdentity,
    init_pid: u32,
    pids: Vec<u32>,
    labels: HashMap<String, String>,
}

impl Entity {
    pub fn new(netns: Arc<NetnsIdentity>, workload: WorkloadIdentity) -> Self {
        Self {
            netns,
            workload,
            init_pid: 0,
            pids: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn with_init_pid(mut self, pid: u32) -> Self {
        self.init_pid = pid;
        self
    }

    pub fn with_pids(mut self, pids: Vec<u32>) -> Self {
        self.pids = pids;
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn pod_name(&self) -> &str {
        &self.workload.name
    }

    pub fn pod_namespace(&self) -> &str {
        &self.workload.namespace
    }

    pub fn workload(&self) -> &WorkloadIdentity {
        &self.workload
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn is_host_network(&self) -> bool {
        self.netns.is_host_network
    }

    /// Network namespace inode number
    pub fn netns(&self) -> u64 {
        self.netns.inum
    }

    /// Shared namespace identity, cloned by reference when another workload
    /// lives in the same namespace
    pub fn netns_identity(&self) -> &Arc<NetnsIdentity> {
        &self.netns
    }

    pub fn netns_mount_point(&self) -> &Path {
        &self.netns.mount_path
    }

    pub fn ip_list(&self) -> &[IpAddr] {
        &self.netns.ip_list
    }

    /// Representative process of the namespace, 0 when none is known
    pub fn pid(&self) -> u32 {
        self.init_pid
    }

    pub fn pids(&self) -> &[u32] {
        &self.pids
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workload.namespace, self.workload.name)
    }
}
