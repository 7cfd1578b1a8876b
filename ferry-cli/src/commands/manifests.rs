//! Manifest command handlers
//!
//! Compile the prepared pipeline for the effective build number and print
//! the requested objects.

use anyhow::{Context, Result, anyhow};
use colored::*;
use ferry_compiler::{Compiler, KeyPair};
use k8s_openapi::api::core::v1::Pod;
use tracing::info;

use super::output;
use crate::config::Config;

fn compiler(config: &Config) -> Result<Compiler> {
    let pipeline = config.prepare()?;
    let build_no = config.effective_build(&pipeline)?;
    info!(pipeline = pipeline.name(), build_no, "Compiling run");
    Ok(Compiler::new(&pipeline, build_no))
}

fn keys() -> Result<KeyPair> {
    KeyPair::generate().context("Failed to generate rsync keypair")
}

pub fn all(config: &Config) -> Result<()> {
    let compiler = compiler(config)?;
    let run = compiler.compile(&keys()?)?;

    output::print(&[
        output::document(&run.config_map)?,
        output::document(&run.secret)?,
        output::document(&run.control_pod)?,
    ])
}

/// Find a stage pod by stage name or by its `NN-name` key
fn find_stage<'a>(stages: impl IntoIterator<Item = (&'a String, &'a Pod)>, name: &str) -> Option<&'a Pod> {
    stages.into_iter().find_map(|(key, pod)| {
        let key = key.trim_end_matches(".yaml");
        let stage = key.split_once('-').map(|(_, stage)| stage);
        (key == name || stage == Some(name)).then_some(pod)
    })
}

pub fn stage(config: &Config, name: &str) -> Result<()> {
    let stages = compiler(config)?.stage_pods()?;
    let pod = find_stage(&stages, name).ok_or_else(|| {
        anyhow!(
            "{}",
            format!("✗ No stage named '{}'", name).red().bold()
        )
    })?;

    output::print(&[output::document(pod)?])
}

pub fn stage_names(config: &Config) -> Result<()> {
    for key in compiler(config)?.stage_pods()?.keys() {
        println!("{}", key.trim_end_matches(".yaml"));
    }
    Ok(())
}

pub fn config_map(config: &Config) -> Result<()> {
    output::print(&[output::document(&compiler(config)?.config_map()?)?])
}

pub fn control_pod(config: &Config) -> Result<()> {
    output::print(&[output::document(&compiler(config)?.control_pod())?])
}

pub fn secret(config: &Config) -> Result<()> {
    let secret = compiler(config)?.rsync_secret(&keys()?);
    output::print(&[output::document(&secret)?])
}
