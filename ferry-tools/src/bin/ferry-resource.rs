//! Ferry Resource
//!
//! Wraps a Concourse-style resource script inside a stage pod. Waits for
//! its semaphore, builds the input document from the `<prefix>.*`
//! environment and runs the script with it on stdin.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_tools::{FsMarkers, ResourceWrapper, WrapperConfig};

#[derive(Parser, Debug)]
#[command(name = "ferry-resource")]
#[command(about = "Run a resource script once its semaphore is released", long_about = None)]
#[command(version)]
struct Cli {
    /// Only variables under `<prefix>.` are passed to the resource
    #[arg(long, env = "FERRY_RESOURCE_ENV_PREFIX")]
    env_prefix: String,

    /// Start the script once this file is gone
    #[arg(long)]
    semaphore_file: PathBuf,

    /// Extra variables in `key=value` form, read once the semaphore is gone;
    /// they take precedence over the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    #[arg(long)]
    ignore_missing_env_file: bool,

    #[arg(long)]
    delete_env_file_after_read: bool,

    /// Also write the script's stdout here
    #[arg(long)]
    stdout_file: Option<PathBuf>,

    /// Also write the script's stderr here
    #[arg(long)]
    stderr_file: Option<PathBuf>,

    /// Write a reproduction script here when the resource fails
    #[arg(long)]
    debug_out: Option<PathBuf>,

    /// Keep the container alive for a while after a failure
    #[arg(long)]
    wait_on_fail: bool,

    /// Print the input document and exit
    #[arg(long)]
    just_print_json: bool,

    /// Resource script and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the resource script
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_tools=info,ferry_resource=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = WrapperConfig::new(cli.env_prefix, cli.semaphore_file, cli.script);
    config.env_file = cli.env_file;
    config.ignore_missing_env_file = cli.ignore_missing_env_file;
    config.delete_env_file_after_read = cli.delete_env_file_after_read;
    config.stdout_file = cli.stdout_file;
    config.stderr_file = cli.stderr_file;
    config.debug_out = cli.debug_out;
    config.wait_on_fail = cli.wait_on_fail;
    config.just_print_json = cli.just_print_json;
    if let Some(bin) = std::env::args().next() {
        config.bin = bin;
    }

    let code = ResourceWrapper::new(config, std::env::vars().collect(), FsMarkers)
        .run()
        .await
        .context("Resource wrapper failed")?;
    if code == 0 {
        info!("Resource finished");
    } else {
        error!(code, "Resource failed");
    }

    std::process::exit(code);
}
