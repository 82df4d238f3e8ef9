//! Resolution of the agent's own context at startup
//!
//! Produces the anchor entity: the host network namespace when running as a
//! node agent, or the agent's own pod when running as a sidecar.

use crate::entity::{Entity, NetnsIdentity, WorkloadIdentity};
use crate::error::{Error, Result};
use crate::introspect::HostIntrospect;
use anyhow::{anyhow, Context};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::{info, warn};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const POD_NAMESPACE_ENV: &str = "KUBESKOOP_POD_NAMESPACE";
pub const POD_NAME_ENV: &str = "KUBESKOOP_POD_NAME";

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const HOSTNAME_FILE: &str = "/etc/hostname";

/// Where the sidecar looks for its own pod identity
#[derive(Debug, Clone)]
pub struct IdentitySource {
    pub namespace_env: Option<String>,
    pub name_env: Option<String>,
    pub namespace_file: PathBuf,
    pub token_file: PathBuf,
    pub hostname_file: PathBuf,
}

impl IdentitySource {
    /// Read the environment and use the standard in-pod file locations
    pub fn from_env() -> Self {
        Self {
            namespace_env: env::var(POD_NAMESPACE_ENV).ok(),
            name_env: env::var(POD_NAME_ENV).ok(),
            namespace_file: PathBuf::from(SERVICE_ACCOUNT_NAMESPACE),
            token_file: PathBuf::from(SERVICE_ACCOUNT_TOKEN),
            hostname_file: PathBuf::from(HOSTNAME_FILE),
        }
    }

    /// Resolve namespace and pod name.
    ///
    /// Namespace: env, then the service-account namespace file.
    /// Name: env, then the service-account token, then the hostname file.
    pub fn resolve(&self) -> Result<WorkloadIdentity> {
        let namespace = match non_empty(self.namespace_env.as_deref()) {
            Some(ns) => ns,
            None => {
                info!(
                    "failed get pod namespace for sidecar mode from env {}, try from k8s serviceaccount",
                    POD_NAMESPACE_ENV
                );
                read_trimmed(&self.namespace_file).map_err(|e| {
                    Error::PodIdentity(format!("failed get namespace in sidecar mode: {:#}", e))
                })?
            }
        };

        let name = match non_empty(self.name_env.as_deref()) {
            Some(name) => name,
            None => {
                info!(
                    "failed get pod name for sidecar mode from env {}, try from k8s serviceaccount",
                    POD_NAME_ENV
                );
                match pod_name_from_token(&self.token_file) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!(
                            "failed get pod name from {}: {:#}, fallback to hostname",
                            self.token_file.display(),
                            e
                        );
                        read_trimmed(&self.hostname_file).map_err(|e| {
                            Error::PodIdentity(format!(
                                "failed get pod name in sidecar mode: {:#}",
                                e
                            ))
                        })?
                    }
                }
            }
        };

        Ok(WorkloadIdentity::new(name, namespace))
    }
}

impl Default for IdentitySource {
    fn default() -> Self {
        Self::from_env()
    }
}

#[derive(Deserialize)]
struct TokenClaims {
    #[serde(rename = "kubernetes.io")]
    kubernetes: KubernetesClaims,
}

#[derive(Deserialize)]
struct KubernetesClaims {
    pod: PodClaims,
}

#[derive(Deserialize)]
struct PodClaims {
    name: String,
}

/// Extract the bound pod name from a projected service-account token
fn pod_name_from_token(path: &Path) -> anyhow::Result<String> {
    let token = fs::read_to_string(path)
        .with_context(|| format!("failed get pod token from {}", path.display()))?;

    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(anyhow!("invalid serviceaccount token format"));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .context("failed decode serviceaccount token")?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).context("failed unmarshal serviceaccount token")?;

    let name = claims.kubernetes.pod.name.trim().to_string();
    if name.is_empty() {
        return Err(anyhow!("serviceaccount token is not bound to a pod"));
    }
    Ok(name)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn read_trimmed(path: &Path) -> anyhow::Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed read {}", path.display()))?;
    let value = contents.trim();
    if value.is_empty() {
        return Err(anyhow!("{} is empty", path.display()));
    }
    Ok(value.to_string())
}

/// Build the anchor entity for the agent's own process.
///
/// `sidecar` carries the identity source in sidecar mode; `None` means the
/// agent runs on the host network namespace.
pub fn build_anchor(host: &dyn HostIntrospect, sidecar: Option<&IdentitySource>) -> Result<Entity> {
    let self_pid = std::process::id();

    let inum = host
        .namespace_inode_of(self_pid)
        .map_err(|e| Error::HostNamespace(format!("{:#}", e)))?;
    let ip_list = host
        .host_link_addresses()
        .map_err(|e| Error::HostAddresses(format!("{:#}", e)))?;

    let netns = Arc::new(NetnsIdentity::for_pid(
        inum,
        self_pid,
        sidecar.is_none(),
        ip_list,
    ));

    let workload = match sidecar {
        Some(source) => source.resolve()?,
        None => WorkloadIdentity::default(),
    };

    info!(
        "anchor entity: netns={} ips={:?} sidecar={}",
        inum,
        netns.ip_list,
        sidecar.is_some()
    );

    Ok(Entity::new(netns, workload).with_init_pid(self_pid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> IdentitySource {
        IdentitySource {
            namespace_env: None,
            name_env: None,
            namespace_file: dir.path().join("namespace"),
            token_file: dir.path().join("token"),
            hostname_file: dir.path().join("hostname"),
        }
    }

    fn token_for(payload: &str) -> String {
        format!("eyJhbGciOiJSUzI1NiJ9.{}.c2lnbmF0dXJl", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(&dir);
        src.namespace_env = Some("kube-system".to_string());
        src.name_env = Some("coredns-1".to_string());

        let identity = src.resolve().unwrap();
        assert_eq!(identity, WorkloadIdentity::new("coredns-1", "kube-system"));
    }

    #[test]
    fn test_name_from_token() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("namespace"), "prod\n").unwrap();
        fs::write(
            dir.path().join("token"),
            token_for(r#"{"kubernetes.io":{"namespace":"prod","pod":{"name":"web-0","uid":"u"}}}"#),
        )
        .unwrap();
        fs::write(dir.path().join("hostname"), "not-used\n").unwrap();

        let identity = source(&dir).resolve().unwrap();
        assert_eq!(identity, WorkloadIdentity::new("web-0", "prod"));
    }

    #[test]
    fn test_name_falls_back_to_hostname() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hostname"), "web-7c9f\n").unwrap();
        let mut src = source(&dir);
        src.namespace_env = Some("default".to_string());

        let identity = src.resolve().unwrap();
        assert_eq!(identity, WorkloadIdentity::new("web-7c9f", "default"));
    }

    #[test]
    fn test_malformed_token_falls_back_to_hostname() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("token"), "not-a-jwt").unwrap();
        fs::write(dir.path().join("hostname"), "host-a").unwrap();
        let mut src = source(&dir);
        src.namespace_env = Some("default".to_string());

        assert_eq!(src.resolve().unwrap().name, "host-a");
    }

    #[test]
    fn test_missing_namespace_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hostname"), "host-a").unwrap();
        let mut src = source(&dir);
        src.name_env = Some("web-0".to_string());

        assert!(matches!(src.resolve(), Err(Error::PodIdentity(_))));
    }

    #[test]
    fn test_no_name_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(&dir);
        src.namespace_env = Some("default".to_string());

        assert!(matches!(src.resolve(), Err(Error::PodIdentity(_))));
    }
}
