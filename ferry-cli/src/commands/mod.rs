//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod manifests;
mod output;
mod pipeline;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print every object of the run: config map, secret and control pod
    All,
    /// Print the pod of one stage
    Stage {
        /// Stage name (`build`) or config map key (`01-build`)
        name: String,
    },
    /// List the config map keys of the stage pods
    StageNames,
    /// Print the config map holding the stage pods
    ConfigMap,
    /// Print the control pod
    ControlPod,
    /// Print the secret with a fresh rsync keypair
    Secret,
    /// Print the pipeline with defaults applied
    Defaults,
    /// Validate the pipeline
    Validate,
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::All => manifests::all(config),
        Commands::Stage { name } => manifests::stage(config, &name),
        Commands::StageNames => manifests::stage_names(config),
        Commands::ConfigMap => manifests::config_map(config),
        Commands::ControlPod => manifests::control_pod(config),
        Commands::Secret => manifests::secret(config),
        Commands::Defaults => pipeline::defaults(config),
        Commands::Validate => pipeline::validate(config),
    }
}
