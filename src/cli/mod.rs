pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skoop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Node-local workload identity cache for Kubernetes network diagnosis",
    long_about = None
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to a YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Run as a sidecar caching only its own pod")]
    pub sidecar: bool,

    #[arg(long, global = true, help = "Seconds between refresh cycles")]
    pub refresh_interval: Option<u64>,

    #[arg(long = "runtime-endpoint", global = true, help = "CRI endpoint to probe (repeatable)")]
    pub runtime_endpoints: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the cache until interrupted")]
    Run,
    #[command(about = "Build the cache once and print its entities")]
    Snapshot {
        #[arg(
            short,
            long,
            value_enum,
            default_value_t = OutputFormat::Table,
            help = "Output format"
        )]
        format: OutputFormat,

        #[arg(long, help = "Print cache metrics after the entities")]
        metrics: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
