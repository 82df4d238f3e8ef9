//! Host introspection primitives consumed by the collector

use crate::cgroup::CgroupResolver;
use crate::netns;
use anyhow::Result;
use log::debug;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

/// procfs mount point
const PROC_ROOT: &str = "/proc";

/// Command name of the pod infrastructure process
const PAUSE_COMM: &str = "pause";

/// OS queries the cache needs about processes, namespaces and links
pub trait HostIntrospect: Send + Sync {
    /// Network namespace inode of a process
    fn namespace_inode_of(&self, pid: u32) -> Result<u64>;

    /// PIDs under a runtime-reported cgroup path, optionally without the
    /// sandbox infrastructure process. Unreadable cgroups yield no PIDs.
    fn pids_under_cgroup(&self, cgroup_path: &str, exclude_init: bool) -> Vec<u32>;

    /// Global-unicast addresses of the links visible to the agent
    fn host_link_addresses(&self) -> Result<Vec<IpAddr>>;
}

/// [`HostIntrospect`] backed by procfs, cgroupfs and getifaddrs
#[derive(Debug, Clone)]
pub struct LinuxHost {
    proc_root: PathBuf,
    cgroups: CgroupResolver,
}

impl LinuxHost {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
            cgroups: CgroupResolver::new(),
        }
    }

    /// Use alternate procfs and cgroupfs mounts, e.g. a host `/proc`
    /// bind-mounted into the agent container
    pub fn with_roots(proc_root: PathBuf, cgroup_root: PathBuf) -> Self {
        Self {
            proc_root,
            cgroups: CgroupResolver::with_root(cgroup_root),
        }
    }

    pub fn cgroups(&self) -> &CgroupResolver {
        &self.cgroups
    }

    fn is_pause(&self, pid: u32) -> bool {
        fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
            .map(|comm| comm.trim() == PAUSE_COMM)
            .unwrap_or(false)
    }
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostIntrospect for LinuxHost {
    fn namespace_inode_of(&self, pid: u32) -> Result<u64> {
        netns::namespace_inode(&self.proc_root, pid)
    }

    fn pids_under_cgroup(&self, cgroup_path: &str, exclude_init: bool) -> Vec<u32> {
        let mut pids = self.cgroups.pids_under(cgroup_path);
        if exclude_init {
            pids.retain(|pid| !self.is_pause(*pid));
        }
        debug!("Found {} pids under cgroup {}", pids.len(), cgroup_path);
        pids
    }

    fn host_link_addresses(&self) -> Result<Vec<IpAddr>> {
        netns::host_link_addresses()
    }
}
