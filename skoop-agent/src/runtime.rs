//! Container runtime contract used by the runtime-backed collector
//!
//! The collector only needs three things from a runtime: the list of ready
//! pod sandboxes, the verbose status of one sandbox, and a way to extract
//! the sandbox's process id and cgroup parent from that status.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Verbose info key holding containerd's sandbox document
pub const INFO_KEY: &str = "info";

/// Verbose info key holding the docker inspect document of a sandbox
pub const DOCKER_INSPECT_KEY: &str = "dockerInspect";

/// Version details reported by the runtime at connection time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub version: String,
    pub runtime_name: String,
    pub runtime_version: String,
}

/// Runtimes whose sandbox info layout is understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKind {
    Containerd,
    Docker,
    Other(String),
}

impl RuntimeKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "containerd" => Self::Containerd,
            "docker" => Self::Docker,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxMetadata {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

/// A ready pod sandbox as listed by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxRef {
    pub id: String,
    pub metadata: Option<SandboxMetadata>,
    pub labels: HashMap<String, String>,
}

/// Status of one sandbox, with runtime-specific verbose info
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxStatus {
    pub id: String,
    /// Primary pod IP, absent for sandboxes without network status
    pub ip: Option<String>,
    pub info: HashMap<String, String>,
}

/// What the collector needs out of a sandbox's verbose info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxInfo {
    pub pid: u32,
    pub cgroup_parent: String,
}

/// Enumeration contract of a container runtime
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Runtime details captured when the client was initialized
    fn info(&self) -> &RuntimeInfo;

    /// All pod sandboxes in the ready state
    async fn list_ready_sandboxes(&self) -> Result<Vec<SandboxRef>>;

    /// Status of one sandbox; `verbose` requests the runtime info map
    async fn sandbox_status(&self, id: &str, verbose: bool) -> Result<SandboxStatus>;
}

#[derive(Deserialize)]
struct ContainerdInfo {
    #[serde(default)]
    pid: u32,
    #[serde(default)]
    config: Option<ContainerdConfig>,
}

#[derive(Deserialize)]
struct ContainerdConfig {
    #[serde(default)]
    linux: Option<ContainerdLinux>,
}

#[derive(Deserialize)]
struct ContainerdLinux {
    #[serde(default)]
    cgroup_parent: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

#[derive(Deserialize)]
struct DockerInspect {
    #[serde(rename = "State")]
    state: DockerState,
    #[serde(rename = "HostConfig", default)]
    host_config: Option<DockerHostConfig>,
}

#[derive(Deserialize)]
struct DockerState {
    #[serde(rename = "Pid")]
    pid: u32,
}

#[derive(Deserialize)]
struct DockerHostConfig {
    #[serde(rename = "CgroupParent", default)]
    cgroup_parent: String,
}

/// Extract the sandbox process id and cgroup parent from a verbose status.
///
/// Runtimes other than containerd and docker are reported as unsupported
/// rather than guessed at.
pub fn sandbox_info(kind: &RuntimeKind, status: &SandboxStatus) -> Result<SandboxInfo> {
    let info = match kind {
        RuntimeKind::Containerd => containerd_info(status)?,
        RuntimeKind::Docker => docker_info(status)?,
        RuntimeKind::Other(name) => return Err(Error::UnsupportedRuntime(name.clone())),
    };

    if info.pid == 0 {
        return Err(Error::SandboxInfo(format!(
            "sandbox {} reports no running process",
            status.id
        )));
    }
    Ok(info)
}

fn containerd_info(status: &SandboxStatus) -> Result<SandboxInfo> {
    let raw = status
        .info
        .get(INFO_KEY)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::SandboxInfo("sandbox status does not contains \"info\" field".to_string())
        })?;

    let parsed: ContainerdInfo = serde_json::from_str(raw)
        .map_err(|e| Error::SandboxInfo(format!("failed unmarshal info to struct: {}", e)))?;

    Ok(SandboxInfo {
        pid: parsed.pid,
        cgroup_parent: parsed
            .config
            .and_then(|c| c.linux)
            .map(|l| l.cgroup_parent)
            .unwrap_or_default(),
    })
}

fn docker_info(status: &SandboxStatus) -> Result<SandboxInfo> {
    let raw = status
        .info
        .get(DOCKER_INSPECT_KEY)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::SandboxInfo(format!("sandbox {} has no docker inspect data", status.id))
        })?;

    let inspect = match serde_json::from_str::<OneOrMany<DockerInspect>>(raw)
        .map_err(|e| Error::SandboxInfo(format!("failed unmarshal docker inspect: {}", e)))?
    {
        OneOrMany::One(inspect) => inspect,
        OneOrMany::Many(list) => list.into_iter().next().ok_or_else(|| {
            Error::SandboxInfo(format!("docker inspect of {} is empty", status.id))
        })?,
    };

    Ok(SandboxInfo {
        pid: inspect.state.pid,
        cgroup_parent: inspect
            .host_config
            .map(|h| h.cgroup_parent)
            .unwrap_or_default(),
    })
}
