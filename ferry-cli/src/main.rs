//! Ferry CLI
//!
//! Offline front end of the pipeline compiler. Reads a pipeline document,
//! applies defaults, validates it and prints the manifests of one run as
//! YAML on stdout.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry pipeline compiler", long_about = None)]
struct Cli {
    /// Pipeline document, `-` reads stdin
    #[arg(short, long, env = "FERRY_PIPELINE", default_value = "-")]
    config: String,

    /// Build number of the run, before the pipeline's offset is added
    #[arg(short, long, default_value_t = 42)]
    build: i64,

    /// Use the document as is
    #[arg(long)]
    no_defaults: bool,

    /// Skip validation
    #[arg(long)]
    no_validate: bool,

    /// Log to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the manifests
    let default_filter = if cli.verbose {
        "ferry_cli=info,ferry_compiler=info"
    } else {
        "ferry_cli=warn,ferry_compiler=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config {
        source: cli.config,
        build: cli.build,
        apply_defaults: !cli.no_defaults,
        validate: !cli.no_validate,
    };

    handle_command(cli.command, &config)
}
