use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::Config;
use crate::metrics::{CacheMetrics, PrometheusExporter};
use crate::startup::Agent;
use crate::{Result, SkoopError};
use serde::Serialize;
use skoop_agent::{Entity, TopologyCache};
use std::collections::BTreeMap;
use tokio::signal;
use tracing::{info, warn};

pub async fn handle_command(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(config).await,
        Commands::Snapshot { format, metrics } => handle_snapshot(config, format, metrics).await,
    }
}

/// File values, then command-line overrides
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    if cli.sidecar {
        config.sidecar = true;
    }
    if let Some(secs) = cli.refresh_interval {
        config.refresh_interval_secs = secs;
    }
    if !cli.runtime_endpoints.is_empty() {
        config.runtime_endpoints = cli.runtime_endpoints.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn handle_run(config: Config) -> Result<()> {
    let mut agent = Agent::start(&config).await?;
    let metrics = match &config.metrics_file {
        Some(_) => Some(CacheMetrics::new()?),
        None => None,
    };

    info!(
        "Cache running with {} entities. Press Ctrl+C to exit.",
        agent.cache.current_snapshot().len()
    );

    let mut ticker = tokio::time::interval(config.refresh_interval());
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if let (Some(metrics), Some(path)) = (&metrics, &config.metrics_file) {
                    metrics.observe(agent.cache.stats(), agent.cache.index_sizes());
                    if let Err(e) = PrometheusExporter::new(metrics).write_textfile(path) {
                        warn!("Failed to write metrics to {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    agent.stop().await;
    info!("skoop stopped");
    Ok(())
}

async fn handle_snapshot(config: Config, format: OutputFormat, with_metrics: bool) -> Result<()> {
    let mut agent = Agent::start(&config).await?;

    let output = match format {
        OutputFormat::Table => render_table(&agent.cache),
        OutputFormat::Json => render_json(&agent.cache)?,
    };
    println!("{}", output);

    if with_metrics {
        let metrics = CacheMetrics::new()?;
        metrics.observe(agent.cache.stats(), agent.cache.index_sizes());
        println!("{}", PrometheusExporter::new(&metrics).render()?);
    }

    agent.stop().await;
    Ok(())
}

#[derive(Debug, Serialize)]
struct EntityRecord {
    namespace: String,
    name: String,
    netns: u64,
    netns_path: String,
    host_network: bool,
    pid: u32,
    pids: Vec<u32>,
    ips: Vec<String>,
    labels: BTreeMap<String, String>,
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        Self {
            namespace: entity.pod_namespace().to_string(),
            name: entity.pod_name().to_string(),
            netns: entity.netns(),
            netns_path: entity.netns_mount_point().display().to_string(),
            host_network: entity.is_host_network(),
            pid: entity.pid(),
            pids: entity.pids().to_vec(),
            ips: entity.ip_list().iter().map(|ip| ip.to_string()).collect(),
            labels: entity
                .labels()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn render_json(cache: &TopologyCache) -> Result<String> {
    let records: Vec<EntityRecord> = cache
        .current_snapshot()
        .iter()
        .map(|entity| EntityRecord::from(entity.as_ref()))
        .collect();
    serde_json::to_string_pretty(&records).map_err(|e| SkoopError::IoError(e.into()))
}

fn render_table(cache: &TopologyCache) -> String {
    let mut out = format!(
        "{:<40} {:<12} {:<6} {:<8} {:<6} {}",
        "WORKLOAD", "NETNS", "HOST", "PID", "PIDS", "IPS"
    );

    for entity in cache.current_snapshot().iter() {
        let workload = if entity.workload().is_empty() {
            "<host>".to_string()
        } else {
            entity.to_string()
        };
        let ips: Vec<String> = entity.ip_list().iter().map(|ip| ip.to_string()).collect();

        out.push('\n');
        out.push_str(&format!(
            "{:<40} {:<12} {:<6} {:<8} {:<6} {}",
            workload,
            entity.netns(),
            entity.is_host_network(),
            entity.pid(),
            entity.pids().len(),
            ips.join(",")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use skoop_agent::{NetnsIdentity, WorkloadIdentity};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skoop.yaml");
        std::fs::write(&path, "refresh_interval_secs: 30\ncrictl_path: /usr/local/bin/crictl\n")
            .unwrap();

        let cli = Cli::parse_from([
            "skoop",
            "--config",
            path.to_str().unwrap(),
            "--refresh-interval",
            "15",
            "--sidecar",
        ]);
        let config = resolve_config(&cli).unwrap();

        assert_eq!(config.refresh_interval_secs, 15);
        assert!(config.sidecar);
        assert_eq!(config.crictl_path.to_str(), Some("/usr/local/bin/crictl"));
    }

    #[test]
    fn test_entity_record() {
        let netns = Arc::new(NetnsIdentity::for_pid(
            4026532281,
            812,
            false,
            vec!["10.244.1.7".parse().unwrap()],
        ));
        let entity = Entity::new(netns, WorkloadIdentity::new("coredns-5d78c", "kube-system"))
            .with_init_pid(812)
            .with_pids(vec![812, 840])
            .with_labels(HashMap::from([("k8s-app".to_string(), "kube-dns".to_string())]));

        let record = EntityRecord::from(&entity);
        assert_eq!(record.namespace, "kube-system");
        assert_eq!(record.netns_path, "/proc/812/ns/net");
        assert_eq!(record.ips, vec!["10.244.1.7"]);
        assert_eq!(record.labels.get("k8s-app").map(String::as_str), Some("kube-dns"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["pids"], serde_json::json!([812, 840]));
    }
}
