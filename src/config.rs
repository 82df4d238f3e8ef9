//! Agent configuration loaded from an optional YAML file

use crate::{Result, SkoopError};
use serde::{Deserialize, Serialize};
use skoop_agent::crictl::DEFAULT_RUNTIME_ENDPOINTS;
use skoop_agent::CacheConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const NODE_NAME_ENV: &str = "NODE_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seconds between refresh cycles, also the per-cycle deadline
    pub refresh_interval_secs: u64,
    /// Cache only the pod the agent is injected into
    pub sidecar: bool,
    /// CRI endpoints probed in order
    pub runtime_endpoints: Vec<String>,
    pub crictl_path: PathBuf,
    pub proc_root: PathBuf,
    pub cgroup_root: PathBuf,
    /// Node whose pods the API-server watch follows
    pub node_name: Option<String>,
    /// Prometheus textfile rewritten after every refresh
    pub metrics_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: skoop_agent::config::DEFAULT_REFRESH_INTERVAL.as_secs(),
            sidecar: false,
            runtime_endpoints: DEFAULT_RUNTIME_ENDPOINTS
                .iter()
                .map(|ep| ep.to_string())
                .collect(),
            crictl_path: PathBuf::from("crictl"),
            proc_root: PathBuf::from("/proc"),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            node_name: None,
            metrics_file: None,
        }
    }
}

impl Config {
    /// Load from `path`, or use defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    SkoopError::ConfigError(format!("failed to read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&contents)?
            }
            None => Self::default(),
        };

        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| SkoopError::ConfigError(format!("invalid configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(SkoopError::ConfigError(
                "refresh_interval_secs must be greater than 0".to_string(),
            ));
        }
        if !self.sidecar && self.runtime_endpoints.is_empty() {
            debug!("No runtime endpoints configured, the API-server watch will be used");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.refresh_interval())
    }

    /// Configured node name, else `NODE_NAME`, else the local hostname
    pub fn resolve_node_name(&self) -> Result<String> {
        if let Some(name) = self.node_name.as_deref().filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }
        if let Ok(name) = std::env::var(NODE_NAME_ENV) {
            if !name.is_empty() {
                return Ok(name);
            }
        }
        hostname::get()
            .map_err(SkoopError::IoError)?
            .into_string()
            .map_err(|_| SkoopError::ConfigError("hostname is not valid UTF-8".to_string()))
    }
}
