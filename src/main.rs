use clap::Parser;
use skoop::cli::{commands, Cli};
use std::process;
use tracing::info;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init also forwards `log` records from the cache crate
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish()
        .try_init()
        .expect("Failed to set tracing subscriber");

    info!("Starting skoop v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = commands::handle_command(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
