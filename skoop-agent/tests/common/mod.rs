#![allow(dead_code)]

use async_trait::async_trait;
use skoop_agent::runtime::{
    RuntimeClient, RuntimeInfo, SandboxMetadata, SandboxRef, SandboxStatus, INFO_KEY,
};
use skoop_agent::{HostIntrospect, LocalWorkload, WorkloadWatch};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const ANCHOR_INODE: u64 = 1;
pub const HOST_IP: &str = "192.168.0.10";

/// In-memory procfs/cgroupfs/links
pub struct FakeHost {
    inodes: Mutex<HashMap<u32, u64>>,
    cgroups: Mutex<HashMap<String, Vec<u32>>>,
    pause: Mutex<Vec<u32>>,
    no_self_netns: AtomicBool,
    no_links: AtomicBool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            inodes: Mutex::new(HashMap::new()),
            cgroups: Mutex::new(HashMap::new()),
            pause: Mutex::new(Vec::new()),
            no_self_netns: AtomicBool::new(false),
            no_links: AtomicBool::new(false),
        }
    }

    pub fn process(&self, pid: u32, inode: u64) {
        self.inodes.lock().unwrap().insert(pid, inode);
    }

    pub fn cgroup(&self, path: &str, pids: &[u32]) {
        self.cgroups
            .lock()
            .unwrap()
            .insert(path.to_string(), pids.to_vec());
    }

    pub fn pause_process(&self, pid: u32) {
        self.pause.lock().unwrap().push(pid);
    }

    /// Make the agent's own namespace unreadable
    pub fn hide_self_netns(&self) {
        self.no_self_netns.store(true, Ordering::SeqCst);
    }

    /// Make link address enumeration fail
    pub fn fail_links(&self) {
        self.no_links.store(true, Ordering::SeqCst);
    }
}

impl HostIntrospect for FakeHost {
    fn namespace_inode_of(&self, pid: u32) -> anyhow::Result<u64> {
        if pid == std::process::id() {
            if self.no_self_netns.load(Ordering::SeqCst) {
                anyhow::bail!("permission denied reading /proc/{}/ns/net", pid);
            }
            return Ok(ANCHOR_INODE);
        }
        self.inodes
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no such process {}", pid))
    }

    fn pids_under_cgroup(&self, cgroup_path: &str, exclude_init: bool) -> Vec<u32> {
        let mut pids = self
            .cgroups
            .lock()
            .unwrap()
            .get(cgroup_path)
            .cloned()
            .unwrap_or_default();
        if exclude_init {
            let pause = self.pause.lock().unwrap();
            pids.retain(|pid| !pause.contains(pid));
        }
        pids
    }

    fn host_link_addresses(&self) -> anyhow::Result<Vec<IpAddr>> {
        if self.no_links.load(Ordering::SeqCst) {
            anyhow::bail!("netlink socket unavailable");
        }
        Ok(vec![HOST_IP.parse().unwrap()])
    }
}

/// Sandbox served by [`FakeRuntime`]
#[derive(Clone)]
pub struct FakeSandbox {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub pid: u32,
    pub ip: Option<String>,
    pub cgroup: String,
}

impl FakeSandbox {
    pub fn new(name: &str, namespace: &str, pid: u32, ip: Option<&str>, cgroup: &str) -> Self {
        Self {
            id: format!("sandbox-{}", name),
            name: name.to_string(),
            namespace: namespace.to_string(),
            pid,
            ip: ip.map(str::to_string),
            cgroup: cgroup.to_string(),
        }
    }
}

/// In-memory containerd-flavoured runtime
pub struct FakeRuntime {
    info: RuntimeInfo,
    sandboxes: Mutex<Vec<FakeSandbox>>,
    no_metadata: Mutex<Vec<String>>,
    list_delay: Mutex<Duration>,
    fail_list: AtomicBool,
    list_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(runtime_name: &str) -> Self {
        Self {
            info: RuntimeInfo {
                version: "0.1.0".to_string(),
                runtime_name: runtime_name.to_string(),
                runtime_version: "1.7.0".to_string(),
            },
            sandboxes: Mutex::new(Vec::new()),
            no_metadata: Mutex::new(Vec::new()),
            list_delay: Mutex::new(Duration::ZERO),
            fail_list: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn containerd() -> Self {
        Self::new("containerd")
    }

    pub fn add(&self, sandbox: FakeSandbox) {
        self.sandboxes.lock().unwrap().push(sandbox);
    }

    pub fn remove(&self, name: &str) {
        self.sandboxes.lock().unwrap().retain(|s| s.name != name);
    }

    pub fn drop_metadata(&self, name: &str) {
        self.no_metadata.lock().unwrap().push(name.to_string());
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    fn info(&self) -> &RuntimeInfo {
        &self.info
    }

    async fn list_ready_sandboxes(&self) -> skoop_agent::Result<Vec<SandboxRef>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(skoop_agent::Error::ListSandboxes(
                "connection refused".to_string(),
            ));
        }

        let no_metadata = self.no_metadata.lock().unwrap().clone();
        Ok(self
            .sandboxes
            .lock()
            .unwrap()
            .iter()
            .map(|s| SandboxRef {
                id: s.id.clone(),
                metadata: (!no_metadata.contains(&s.name)).then(|| SandboxMetadata {
                    name: s.name.clone(),
                    namespace: s.namespace.clone(),
                    uid: format!("uid-{}", s.name),
                }),
                labels: HashMap::from([("app".to_string(), s.name.clone())]),
            })
            .collect())
    }

    async fn sandbox_status(&self, id: &str, _verbose: bool) -> skoop_agent::Result<SandboxStatus> {
        let sandboxes = self.sandboxes.lock().unwrap();
        let sandbox = sandboxes
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| skoop_agent::Error::SandboxStatus {
                id: id.to_string(),
                reason: "not found".to_string(),
            })?;

        let info = serde_json::json!({
            "pid": sandbox.pid,
            "config": { "linux": { "cgroup_parent": sandbox.cgroup } },
        });

        Ok(SandboxStatus {
            id: id.to_string(),
            ip: sandbox.ip.clone(),
            info: HashMap::from([(INFO_KEY.to_string(), info.to_string())]),
        })
    }
}

/// In-memory API-server watch
pub struct FakeWatch {
    workloads: Mutex<Vec<LocalWorkload>>,
}

impl FakeWatch {
    pub fn new(workloads: Vec<LocalWorkload>) -> Self {
        Self {
            workloads: Mutex::new(workloads),
        }
    }
}

impl WorkloadWatch for FakeWatch {
    fn list_local_workloads(&self) -> Vec<LocalWorkload> {
        self.workloads.lock().unwrap().clone()
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
