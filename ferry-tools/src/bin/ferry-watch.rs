//! Ferry Watch
//!
//! Waits until the listed containers of a stage pod completed, as reported
//! by the status service of the run, then removes the steps semaphore.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ferry_client::StatusClient;
use ferry_core::domain::annotations::split_list;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_tools::watcher::WATCH_INTERVAL;
use ferry_tools::{FsMarkers, WatchConfig, watch};

#[derive(Parser, Debug)]
#[command(name = "ferry-watch")]
#[command(about = "Release a semaphore once the containers of a pod completed", long_about = None)]
#[command(version)]
struct Cli {
    /// Base URL of the status service
    #[arg(long, env = "FERRY_STATUS_URL")]
    status_url: String,

    /// Pod to watch
    #[arg(long)]
    pod: String,

    /// Comma separated container names
    #[arg(long, default_value = "")]
    containers: String,

    /// Semaphore to remove on completion
    #[arg(long)]
    semaphore_file: PathBuf,

    /// Seconds between two status queries
    #[arg(long, default_value_t = WATCH_INTERVAL.as_secs())]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_tools=info,ferry_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = WatchConfig {
        pod: cli.pod,
        containers: split_list(&cli.containers),
        semaphore_file: cli.semaphore_file,
        interval: Duration::from_secs(cli.interval.max(1)),
    };

    watch(&StatusClient::new(cli.status_url), &config, &FsMarkers).await?;
    Ok(())
}
