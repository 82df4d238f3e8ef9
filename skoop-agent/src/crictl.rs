//! [`RuntimeClient`] driven through the `crictl` binary
//!
//! Each call shells out to `crictl --runtime-endpoint <ep>` and parses its
//! JSON output. For docker (cri-dockerd) the verbose status does not carry
//! sandbox info, so the sandbox container is inspected through `docker`.

use crate::error::{Error, Result};
use crate::runtime::{
    RuntimeClient, RuntimeInfo, RuntimeKind, SandboxMetadata, SandboxRef, SandboxStatus,
    DOCKER_INSPECT_KEY, INFO_KEY,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Endpoints probed when none are configured
pub const DEFAULT_RUNTIME_ENDPOINTS: [&str; 3] = [
    "unix:///run/containerd/containerd.sock",
    "unix:///var/run/cri-dockerd.sock",
    "unix:///run/crio/crio.sock",
];

pub struct CrictlClient {
    binary: PathBuf,
    endpoint: String,
    info: RuntimeInfo,
}

impl CrictlClient {
    /// Probe the endpoints in order and keep the first one that answers
    pub async fn connect(binary: &Path, endpoints: &[String]) -> Result<Self> {
        let mut failures = Vec::new();

        for endpoint in endpoints {
            match run(binary, endpoint, &["version"]).await {
                Ok(output) => {
                    let info = parse_version(&String::from_utf8_lossy(&output));
                    info!(
                        "Connected to runtime {} {} at {}",
                        info.runtime_name, info.runtime_version, endpoint
                    );
                    return Ok(Self {
                        binary: binary.to_path_buf(),
                        endpoint: endpoint.clone(),
                        info,
                    });
                }
                Err(e) => {
                    debug!("Runtime endpoint {} unavailable: {}", endpoint, e);
                    failures.push(format!("{}: {}", endpoint, e));
                }
            }
        }

        Err(Error::RuntimeUnavailable(if failures.is_empty() {
            "no runtime endpoints configured".to_string()
        } else {
            failures.join("; ")
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn docker_inspect(&self, id: &str) -> Option<String> {
        let output = Command::new("docker")
            .args(["inspect", id])
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            warn!(
                "docker inspect {} failed: {}",
                id,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RuntimeClient for CrictlClient {
    fn info(&self) -> &RuntimeInfo {
        &self.info
    }

    async fn list_ready_sandboxes(&self) -> Result<Vec<SandboxRef>> {
        let output = run(
            &self.binary,
            &self.endpoint,
            &["pods", "--state", "ready", "-o", "json"],
        )
        .await
        .map_err(Error::ListSandboxes)?;

        parse_pods(&output).map_err(Error::ListSandboxes)
    }

    async fn sandbox_status(&self, id: &str, verbose: bool) -> Result<SandboxStatus> {
        let mut args = vec!["inspectp", "-o", "json"];
        if !verbose {
            args.push("--quiet");
        }
        args.push(id);

        let output = run(&self.binary, &self.endpoint, &args)
            .await
            .map_err(|reason| Error::SandboxStatus {
                id: id.to_string(),
                reason,
            })?;

        let mut status = parse_inspectp(&output).map_err(|reason| Error::SandboxStatus {
            id: id.to_string(),
            reason,
        })?;

        if verbose && RuntimeKind::from_name(&self.info.runtime_name) == RuntimeKind::Docker {
            if let Some(inspect) = self.docker_inspect(id).await {
                status.info.insert(DOCKER_INSPECT_KEY.to_string(), inspect);
            }
        }
        Ok(status)
    }
}

async fn run(
    binary: &Path,
    endpoint: &str,
    args: &[&str],
) -> std::result::Result<Vec<u8>, String> {
    let output = Command::new(binary)
        .arg("--runtime-endpoint")
        .arg(endpoint)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", binary.display(), e))?;

    if !output.status.success() {
        return Err(format!(
            "{} {} exited with {}: {}",
            binary.display(),
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(output.stdout)
}

/// Parse the `Key: value` lines printed by `crictl version`
fn parse_version(output: &str) -> RuntimeInfo {
    let mut info = RuntimeInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Version" => info.version = value,
            "RuntimeName" => info.runtime_name = value,
            "RuntimeVersion" => info.runtime_version = value,
            _ => {}
        }
    }
    info
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Deserialize)]
struct PodItem {
    id: String,
    #[serde(default)]
    metadata: Option<PodItemMetadata>,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PodItemMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    uid: String,
}

fn parse_pods(output: &[u8]) -> std::result::Result<Vec<SandboxRef>, String> {
    let list: PodList =
        serde_json::from_slice(output).map_err(|e| format!("invalid pods output: {}", e))?;

    Ok(list
        .items
        .into_iter()
        .map(|item| SandboxRef {
            id: item.id,
            metadata: item.metadata.map(|m| SandboxMetadata {
                name: m.name,
                namespace: m.namespace,
                uid: m.uid,
            }),
            labels: item.labels,
        })
        .collect())
}

#[derive(Deserialize)]
struct InspectOutput {
    status: InspectStatus,
    #[serde(default)]
    info: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct InspectStatus {
    id: String,
    #[serde(default)]
    network: Option<InspectNetwork>,
}

#[derive(Deserialize)]
struct InspectNetwork {
    #[serde(default)]
    ip: String,
}

fn parse_inspectp(output: &[u8]) -> std::result::Result<SandboxStatus, String> {
    let inspect: InspectOutput =
        serde_json::from_slice(output).map_err(|e| format!("invalid inspectp output: {}", e))?;

    let mut info = HashMap::new();
    match inspect.info {
        Some(serde_json::Value::Object(map)) => {
            // crictl pretty-prints the info map; containerd nests its
            // document under "info" while older versions flatten it
            match map.get(INFO_KEY) {
                Some(serde_json::Value::String(raw)) => {
                    info.insert(INFO_KEY.to_string(), raw.clone());
                }
                Some(nested) => {
                    info.insert(INFO_KEY.to_string(), nested.to_string());
                }
                None => {
                    info.insert(
                        INFO_KEY.to_string(),
                        serde_json::Value::Object(map).to_string(),
                    );
                }
            }
        }
        Some(serde_json::Value::String(raw)) => {
            info.insert(INFO_KEY.to_string(), raw);
        }
        _ => {}
    }

    Ok(SandboxStatus {
        id: inspect.status.id,
        ip: inspect
            .status
            .network
            .map(|n| n.ip)
            .filter(|ip| !ip.is_empty()),
        info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sandbox_info;

    #[test]
    fn test_parse_version() {
        let info = parse_version(
            "Version:  0.1.0\nRuntimeName:  containerd\nRuntimeVersion:  v1.7.2\nRuntimeApiVersion:  v1\n",
        );
        assert_eq!(info.version, "0.1.0");
        assert_eq!(info.runtime_name, "containerd");
        assert_eq!(info.runtime_version, "v1.7.2");
    }

    #[test]
    fn test_parse_pods() {
        let output = br#"{"items":[
            {"id":"abc","metadata":{"name":"nginx","uid":"u1","namespace":"default","attempt":0},
             "state":"SANDBOX_READY","labels":{"app":"nginx"}},
            {"id":"def","state":"SANDBOX_READY"}
        ]}"#;

        let sandboxes = parse_pods(output).unwrap();
        assert_eq!(sandboxes.len(), 2);
        assert_eq!(sandboxes[0].metadata.as_ref().unwrap().name, "nginx");
        assert_eq!(sandboxes[0].labels.get("app").unwrap(), "nginx");
        assert!(sandboxes[1].metadata.is_none());
    }

    #[test]
    fn test_parse_inspectp_feeds_containerd_extraction() {
        let output = br#"{
            "status":{"id":"abc","network":{"additionalIps":[],"ip":"10.244.1.5"},"state":"SANDBOX_READY"},
            "info":{"pid":321,"config":{"linux":{"cgroup_parent":"kubepods-pod1.slice"}}}
        }"#;

        let status = parse_inspectp(output).unwrap();
        assert_eq!(status.ip.as_deref(), Some("10.244.1.5"));

        let info = sandbox_info(&RuntimeKind::Containerd, &status).unwrap();
        assert_eq!(info.pid, 321);
        assert_eq!(info.cgroup_parent, "kubepods-pod1.slice");
    }

    #[test]
    fn test_parse_inspectp_without_network() {
        let output = br#"{"status":{"id":"abc","network":{"ip":""}}}"#;
        let status = parse_inspectp(output).unwrap();
        assert!(status.ip.is_none());
        assert!(status.info.is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_endpoints() {
        let result = CrictlClient::connect(Path::new("crictl"), &[]).await;
        assert!(matches!(result, Err(Error::RuntimeUnavailable(_))));
    }
}
